use crate::engine::DecodedComponent;
use crate::geometry::SampleType;
use ndarray::{Array3, ArrayView2, ArrayView3, Axis};

/// Element types images are exchanged in.
///
/// Only `u8` and `u16` can be written; every implementor can be read.
pub trait Sample: Copy + 'static {
    /// Bit depth of written samples, `None` when the type cannot be written.
    const WRITE_PRECISION: Option<u8>;

    /// Saturating conversion from a decoded sample.
    fn from_i32(value: i32) -> Self;

    fn to_i32(self) -> i32;

    /// The samples of `image` when they are of this type.
    fn samples(image: &ImageData) -> Option<&Array3<Self>>;
}

macro_rules! sample {
    ($type:ty, $precision:expr, $variant:ident) => {
        impl Sample for $type {
            const WRITE_PRECISION: Option<u8> = $precision;

            fn from_i32(value: i32) -> Self {
                value.clamp(<$type>::MIN as i32, <$type>::MAX as i32) as $type
            }

            fn to_i32(self) -> i32 {
                self as i32
            }

            fn samples(image: &ImageData) -> Option<&Array3<Self>> {
                match image {
                    ImageData::$variant(data) => Some(data),
                    _ => None,
                }
            }
        }
    };
}

sample!(u8, Some(8), U8);
sample!(i8, None, I8);
sample!(u16, Some(16), U16);
sample!(i16, None, I16);

/// Decoded samples laid out as (rows, cols, components).
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(Array3<u8>),
    I8(Array3<i8>),
    U16(Array3<u16>),
    I16(Array3<i16>),
}

fn gather<T: Sample>(rows: usize, cols: usize, components: &[&DecodedComponent]) -> Array3<T> {
    Array3::from_shape_fn((rows, cols, components.len()), |(r, c, k)| {
        T::from_i32(components[k].data[r * cols + c])
    })
}

impl ImageData {
    /// Interleaves `components`, each holding at least `rows * cols`
    /// samples, into one array of the given sample type.
    pub(crate) fn from_components(
        sample_type: SampleType,
        rows: usize,
        cols: usize,
        components: &[&DecodedComponent],
    ) -> ImageData {
        match sample_type {
            SampleType::U8 => ImageData::U8(gather(rows, cols, components)),
            SampleType::I8 => ImageData::I8(gather(rows, cols, components)),
            SampleType::U16 => ImageData::U16(gather(rows, cols, components)),
            SampleType::I16 => ImageData::I16(gather(rows, cols, components)),
        }
    }

    pub fn sample_type(&self) -> SampleType {
        match self {
            ImageData::U8(_) => SampleType::U8,
            ImageData::I8(_) => SampleType::I8,
            ImageData::U16(_) => SampleType::U16,
            ImageData::I16(_) => SampleType::I16,
        }
    }

    /// (rows, cols, components)
    pub fn shape(&self) -> (usize, usize, usize) {
        match self {
            ImageData::U8(data) => data.dim(),
            ImageData::I8(data) => data.dim(),
            ImageData::U16(data) => data.dim(),
            ImageData::I16(data) => data.dim(),
        }
    }

    /// Component `k` as a (rows, cols) view, `None` when the samples are
    /// not of type `T` or there is no such component.
    pub fn band<T: Sample>(&self, k: usize) -> Option<ArrayView2<T>> {
        let data = T::samples(self)?;
        (k < data.dim().2).then(|| data.index_axis(Axis(2), k))
    }

    pub fn as_u8(&self) -> Option<&Array3<u8>> {
        match self {
            ImageData::U8(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_i8(&self) -> Option<&Array3<i8>> {
        match self {
            ImageData::I8(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&Array3<u16>> {
        match self {
            ImageData::U16(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&Array3<i16>> {
        match self {
            ImageData::I16(data) => Some(data),
            _ => None,
        }
    }
}

// One row-major plane per component.
pub(crate) fn planes<T: Sample>(data: &ArrayView3<T>) -> Vec<Vec<i32>> {
    data.axis_iter(Axis(2))
        .map(|plane| plane.iter().map(|sample| sample.to_i32()).collect())
        .collect()
}
