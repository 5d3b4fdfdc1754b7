use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Read, Write};
use std::mem::{align_of, size_of};

/// A fixed-size value with a native byte image.
///
/// The image written by `write_to` is exactly `SIZE` bytes long and places
/// every field where the in-memory layout of `Self` places it, so a dump of
/// a slice of elements can be reloaded on the same platform without any
/// header or conversion.
pub trait Element: Copy + Send + Sync {
    /// Number of bytes in the image. Always `size_of::<Self>()`.
    const SIZE: usize = size_of::<Self>();

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()>;

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self>;
}

/// A value type with a reserved "nothing stored here" sentinel.
///
/// A stored value equal to `EMPTY` is indistinguishable from an absent one.
pub trait EmptyValue: Copy + PartialEq {
    const EMPTY: Self;

    #[inline(always)]
    fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }
}

/// An unsigned integer identifier.
pub trait Id: Element + Ord + fmt::Display {
    /// Largest representable id.
    const MAX_ID: u64;

    /// The slot offset for this id, or `None` if it is not addressable on
    /// this platform.
    fn to_index(self) -> Option<usize>;

    /// Inverse of `to_index` for offsets known to be in range.
    fn from_index(index: usize) -> Self;

    fn as_u64(self) -> u64;
}

impl Element for u8 {
    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u8(*self)
    }

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_u8()
    }
}

impl Element for i8 {
    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i8(*self)
    }

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        reader.read_i8()
    }
}

macro_rules! impl_element {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl Element for $ty {
                fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
                    writer.$write::<NativeEndian>(*self)
                }

                fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
                    reader.$read::<NativeEndian>()
                }
            }
        )*
    };
}

impl_element! {
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
    i16 => write_i16, read_i16;
    i32 => write_i32, read_i32;
    i64 => write_i64, read_i64;
}

macro_rules! impl_empty_value {
    ($($ty:ty => $empty:expr;)*) => {
        $(
            impl EmptyValue for $ty {
                const EMPTY: Self = $empty;
            }
        )*
    };
}

impl_empty_value! {
    u8 => u8::MAX;
    u16 => u16::MAX;
    u32 => u32::MAX;
    u64 => u64::MAX;
    i8 => i8::MIN;
    i16 => i16::MIN;
    i32 => i32::MIN;
    i64 => i64::MIN;
}

macro_rules! impl_id {
    ($($ty:ty),*) => {
        $(
            impl Id for $ty {
                const MAX_ID: u64 = <$ty>::MAX as u64;

                #[inline(always)]
                fn to_index(self) -> Option<usize> {
                    usize::try_from(self).ok()
                }

                #[inline(always)]
                fn from_index(index: usize) -> Self {
                    index as $ty
                }

                #[inline(always)]
                fn as_u64(self) -> u64 {
                    self as u64
                }
            }
        )*
    };
}

impl_id!(u16, u32, u64);

const UNDEFINED_COORDINATE: i32 = i32::MAX;
const COORDINATE_PRECISION: f64 = 10_000_000.0;
const MAX_COORDINATE: i32 = UNDEFINED_COORDINATE - 1;

fn to_fixed(degrees: f64) -> i32 {
    if degrees.is_nan() {
        return UNDEFINED_COORDINATE;
    }
    let fixed = (degrees * COORDINATE_PRECISION).round();
    fixed.clamp(-f64::from(MAX_COORDINATE), f64::from(MAX_COORDINATE)) as i32
}

/// A geographic position stored as two fixed-point coordinates with a
/// precision of 1e-7 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Location {
    x: i32,
    y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Builds a location from longitude and latitude in degrees.
    ///
    /// Degrees beyond the fixed-point range are clamped to the nearest
    /// representable coordinate, which never is the undefined one. NaN
    /// gives an undefined coordinate.
    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Self {
            x: to_fixed(lon),
            y: to_fixed(lat),
        }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn lon(&self) -> f64 {
        f64::from(self.x) / COORDINATE_PRECISION
    }

    pub fn lat(&self) -> f64 {
        f64::from(self.y) / COORDINATE_PRECISION
    }

    /// A location is defined as soon as either coordinate is set.
    pub fn is_defined(&self) -> bool {
        self.x != UNDEFINED_COORDINATE || self.y != UNDEFINED_COORDINATE
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_defined() {
            write!(f, "({:.7},{:.7})", self.lon(), self.lat())
        } else {
            write!(f, "(undefined,undefined)")
        }
    }
}

impl Element for Location {
    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_i32::<NativeEndian>(self.x)?;
        writer.write_i32::<NativeEndian>(self.y)
    }

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let x = reader.read_i32::<NativeEndian>()?;
        let y = reader.read_i32::<NativeEndian>()?;
        Ok(Self { x, y })
    }
}

impl EmptyValue for Location {
    const EMPTY: Self = Self::new(UNDEFINED_COORDINATE, UNDEFINED_COORDINATE);
}

/// One `(id, value)` record of a sparse index.
///
/// The layout is `#[repr(C)]`, so the value sits at the id size rounded up
/// to the value alignment, followed by tail padding up to the struct size.
/// Padding bytes are written as zero and ignored on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Entry<I, V> {
    pub id: I,
    pub value: V,
}

impl<I: Element, V: Element> Entry<I, V> {
    const VALUE_OFFSET: usize = I::SIZE.next_multiple_of(align_of::<V>());
    const TAIL_PADDING: usize = size_of::<Self>() - Self::VALUE_OFFSET - V::SIZE;

    pub fn new(id: I, value: V) -> Self {
        Self { id, value }
    }
}

impl<I, V> From<(I, V)> for Entry<I, V> {
    fn from((id, value): (I, V)) -> Self {
        Self { id, value }
    }
}

impl<I: Element, V: Element> Element for Entry<I, V> {
    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.id.write_to(writer)?;
        write_padding(writer, Self::VALUE_OFFSET - I::SIZE)?;
        self.value.write_to(writer)?;
        write_padding(writer, Self::TAIL_PADDING)
    }

    fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let id = I::read_from(reader)?;
        skip_padding(reader, Self::VALUE_OFFSET - I::SIZE)?;
        let value = V::read_from(reader)?;
        skip_padding(reader, Self::TAIL_PADDING)?;
        Ok(Self { id, value })
    }
}

fn write_padding<W: Write + ?Sized>(writer: &mut W, len: usize) -> io::Result<()> {
    for _ in 0..len {
        writer.write_u8(0)?;
    }
    Ok(())
}

fn skip_padding<R: Read + ?Sized>(reader: &mut R, len: usize) -> io::Result<()> {
    for _ in 0..len {
        reader.read_u8()?;
    }
    Ok(())
}
