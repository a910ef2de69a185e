use std::time::Duration;

use color_eyre::eyre::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Layout},
    style::{Color, Style},
    widgets::{Block, Gauge, Paragraph},
};

use crate::tester::TestInfo;

/// Steps through every program, redrawing the progress gauge between
/// programs. Returns false if the user aborted with `q`.
pub fn run(terminal: &mut DefaultTerminal, info: &mut TestInfo) -> Result<bool> {
    loop {
        terminal.draw(|frame| draw(frame, info))?;

        if event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && key.code == KeyCode::Char('q') {
                    return Ok(false);
                }
            }
        }

        if !info.test_program()? {
            terminal.draw(|frame| draw(frame, info))?;
            return Ok(true);
        }
    }
}

fn draw(frame: &mut Frame, info: &TestInfo) {
    let [gauge_area, status_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(1)]).areas(frame.area());

    let ratio = if info.num_programs == 0 {
        1.0
    } else {
        info.position as f64 / info.num_programs as f64
    };
    let gauge = Gauge::default()
        .block(Block::bordered().title(" cpu16 test "))
        .gauge_style(Style::new().fg(Color::Green))
        .ratio(ratio)
        .label(format!("{}/{}", info.position, info.num_programs));
    frame.render_widget(gauge, gauge_area);

    let status = if info.position < info.num_programs {
        format!("Testing {} (q to abort)", info.currently_testing)
    } else {
        "Done".to_string()
    };
    frame.render_widget(Paragraph::new(status), status_area);
}
