// Macro to create a bitmask
#[macro_export]
macro_rules! bitmask {
    ( $start_bit:expr,$width:expr ) => {{ ((1 << $width) - 1) << $start_bit }};
    ( $end_bit:expr;$start_bit:expr ) => {
        bitmask!($start_bit, $end_bit - $start_bit + 1)
    };
    ( $width:expr ) => {
        bitmask!(0, $width)
    };
}

// Macro to extract bits from a value
#[macro_export]
macro_rules! bits {
    ( $val:expr,$start_bit:expr,$width:expr ) => {{ ($val >> $start_bit) & ((1 << $width) - 1) }};
    ( $val:expr,$end_bit:expr;$start_bit:expr ) => {
        bits!($val, $start_bit, $end_bit - $start_bit + 1)
    };
    ( $val:expr,$bit:expr ) => {
        bits!($val, $bit, 1)
    };
}

/// helper macro to include test files
#[macro_export]
macro_rules! include_test_file {
    ($file_name:literal) => {
        include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../test-files/",
            $file_name
        ))
    };
}

#[test]
fn test_bits() {
    let word: u16 = 0b1010_0110_0000_0101;

    assert_eq!(bits!(word, 0), 0b1);
    assert_eq!(bits!(word, 1), 0b0);
    assert_eq!(bits!(word, 2), 0b1);
    assert_eq!(bits!(word, 15), 0b1);

    assert_eq!(bits!(word, 15;11), 0b10100);
    assert_eq!(bits!(word, 10), 0b1);
    assert_eq!(bits!(word, 9), 0b1);
    assert_eq!(bits!(word, 2;0), 0b101);
    assert_eq!(bits!(word, 3, 3), 0b000);
}

#[test]
fn test_bitmask() {
    assert_eq!(bitmask!(0, 5), 0b11111);
    assert_eq!(bitmask!(10;5), 0b11111100000);
    assert_eq!(bitmask!(3), 0b111);
}
