use byteorder::{ByteOrder, LittleEndian};

/// A value that can be stored in the data section of a struct or in a primitive list.
///
/// Values are always stored little-endian, independent of the host.
pub trait Primitive: Copy {
    /// Number of bytes the value occupies on the wire.
    const SIZE: usize;

    fn read(raw: &[u8]) -> Self;
    fn write(raw: &mut [u8], value: Self);
}

impl Primitive for u8 {
    const SIZE: usize = 1;

    #[inline]
    fn read(raw: &[u8]) -> Self {
        raw[0]
    }

    #[inline]
    fn write(raw: &mut [u8], value: Self) {
        raw[0] = value;
    }
}

impl Primitive for i8 {
    const SIZE: usize = 1;

    #[inline]
    fn read(raw: &[u8]) -> Self {
        raw[0] as i8
    }

    #[inline]
    fn write(raw: &mut [u8], value: Self) {
        raw[0] = value as u8;
    }
}

macro_rules! primitive_impl(
    ($typ:ty, $n:expr, $read:ident, $write:ident) => (
        impl Primitive for $typ {
            const SIZE: usize = $n;

            #[inline]
            fn read(raw: &[u8]) -> Self {
                LittleEndian::$read(raw)
            }

            #[inline]
            fn write(raw: &mut [u8], value: Self) {
                LittleEndian::$write(raw, value)
            }
        }
    );
);

primitive_impl!(u16, 2, read_u16, write_u16);
primitive_impl!(i16, 2, read_i16, write_i16);
primitive_impl!(u32, 4, read_u32, write_u32);
primitive_impl!(i32, 4, read_i32, write_i32);
primitive_impl!(u64, 8, read_u64, write_u64);
primitive_impl!(i64, 8, read_i64, write_i64);
primitive_impl!(f32, 4, read_f32, write_f32);
primitive_impl!(f64, 8, read_f64, write_f64);
