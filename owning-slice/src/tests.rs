use crate::Truncate;

#[test]
fn slice() {
    let mut slice: &[_] = &[0, 1, 2, 3];

    slice.truncate(5u8);
    assert_eq!(slice, [0, 1, 2, 3]);

    slice.truncate(4u8);
    assert_eq!(slice, [0, 1, 2, 3]);

    slice.truncate(2u8);
    assert_eq!(slice, [0, 1]);

    slice.truncate(0u8);
    assert_eq!(slice, []);
}

#[test]
fn slice_mut() {
    let mut slice: &mut [_] = &mut [0, 1, 2, 3];

    slice.truncate(2u16);
    assert_eq!(slice, &mut [0, 1]);

    slice[0] = 42;
    assert_eq!(slice, &mut [42, 1]);

    slice.truncate(3u16);
    assert_eq!(slice, &mut [42, 1]);
}
