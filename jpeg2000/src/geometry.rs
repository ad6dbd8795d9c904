//! Image layout derived from the main header of a codestream.

use crate::error::{Error, Result};
use jpc::{Codestream, CodestreamError, ProgressionOrder, MARKER_SYMBOL_COD, MARKER_SYMBOL_SIZ};

/// Sampling and depth of one component, from SIZ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentGeometry {
    pub dx: u8,
    pub dy: u8,
    pub precision: u8,
    pub signed: bool,
}

/// Element type of decoded samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    U8,
    I8,
    U16,
    I16,
}

impl SampleType {
    /// Smallest type holding samples of the given depth. Depths above 16
    /// bits are not supported.
    pub fn for_precision(precision: u8, signed: bool) -> Result<SampleType> {
        match (precision, signed) {
            (0..=8, false) => Ok(SampleType::U8),
            (0..=8, true) => Ok(SampleType::I8),
            (9..=16, false) => Ok(SampleType::U16),
            (9..=16, true) => Ok(SampleType::I16),
            _ => Err(Error::UnsupportedPrecision { precision }),
        }
    }

    /// Type shared by every (precision, signed) pair, failing when the
    /// components would need different types.
    pub fn common<I>(components: I) -> Result<SampleType>
    where
        I: IntoIterator<Item = (u8, bool)>,
    {
        let mut common: Option<SampleType> = None;
        for (k, (precision, signed)) in components.into_iter().enumerate() {
            let sample_type = SampleType::for_precision(precision, signed)?;
            match common {
                None => common = Some(sample_type),
                Some(first) if first != sample_type => {
                    return Err(Error::MixedPrecision(format!(
                        "component 0 needs {:?} samples, component {} needs {:?}",
                        first, k, sample_type
                    )))
                }
                Some(_) => {}
            }
        }

        common.ok_or_else(|| Error::Configuration("codestream declares no components".to_owned()))
    }

    pub fn bits(&self) -> u8 {
        match self {
            SampleType::U8 | SampleType::I8 => 8,
            SampleType::U16 | SampleType::I16 => 16,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, SampleType::I8 | SampleType::I16)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    // Xsiz, Ysiz
    grid_width: u32,
    grid_height: u32,

    // XOsiz, YOsiz
    grid_horizontal_offset: u32,
    grid_vertical_offset: u32,

    // XTsiz, YTsiz
    tile_width: u32,
    tile_height: u32,

    tiles_across: u32,
    tiles_down: u32,

    components: Vec<ComponentGeometry>,

    decomposition_levels: u8,
    min_decomposition_levels: u8,
    layers: u16,
    progression_order: ProgressionOrder,
}

// ceil(a / (d * 2^r))
fn reduced_ceil(a: u32, d: u8, reduce: u8) -> u64 {
    let divisor = (d as u64).checked_shl(reduce as u32).unwrap_or(u64::MAX);
    (a as u64).div_ceil(divisor)
}

impl Geometry {
    /// Reads SIZ, COD and the main header COC segments of `codestream`.
    pub fn from_codestream(codestream: &Codestream) -> Result<Geometry> {
        let siz = codestream.siz().ok_or(Error::MarkerParse(
            CodestreamError::MarkerMissing {
                marker: MARKER_SYMBOL_SIZ,
            },
        ))?;
        let cod = codestream.cod().ok_or(Error::MarkerParse(
            CodestreamError::MarkerMissing {
                marker: MARKER_SYMBOL_COD,
            },
        ))?;

        let components = siz
            .components()
            .iter()
            .map(|component| ComponentGeometry {
                dx: component.horizontal_separation(),
                dy: component.vertical_separation(),
                precision: component.precision(),
                signed: component.values_are_signed(),
            })
            .collect();

        let decomposition_levels = cod.coding_style_parameters().no_decomposition_levels();
        let min_decomposition_levels = codestream
            .coc_segments()
            .iter()
            .map(|coc| coc.coding_style_parameters().no_decomposition_levels())
            .fold(decomposition_levels, u8::min);

        Ok(Geometry {
            grid_width: siz.reference_grid_width(),
            grid_height: siz.reference_grid_height(),
            grid_horizontal_offset: siz.image_horizontal_offset(),
            grid_vertical_offset: siz.image_vertical_offset(),
            tile_width: siz.reference_tile_width(),
            tile_height: siz.reference_tile_height(),
            tiles_across: siz.num_x_tiles(),
            tiles_down: siz.num_y_tiles(),
            components,
            decomposition_levels,
            min_decomposition_levels,
            layers: cod.no_layers(),
            progression_order: cod.progression_order(),
        })
    }

    /// Height of the image area on the reference grid, Ysiz - YOsiz.
    pub fn rows(&self) -> u32 {
        self.grid_height - self.grid_vertical_offset
    }

    /// Width of the image area on the reference grid, Xsiz - XOsiz.
    pub fn cols(&self) -> u32 {
        self.grid_width - self.grid_horizontal_offset
    }

    /// (YOsiz, XOsiz)
    pub fn grid_offset(&self) -> (u32, u32) {
        (self.grid_vertical_offset, self.grid_horizontal_offset)
    }

    /// (YTsiz, XTsiz)
    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_height, self.tile_width)
    }

    /// Tiles (down, across).
    pub fn num_tiles(&self) -> (u32, u32) {
        (self.tiles_down, self.tiles_across)
    }

    pub fn num_components(&self) -> usize {
        self.components.len()
    }

    pub fn components(&self) -> &[ComponentGeometry] {
        &self.components
    }

    pub fn decomposition_levels(&self) -> u8 {
        self.decomposition_levels
    }

    /// Fewest decomposition levels of any component, the deepest reduction
    /// every component supports.
    pub fn min_decomposition_levels(&self) -> u8 {
        self.min_decomposition_levels
    }

    pub fn layers(&self) -> u16 {
        self.layers
    }

    pub fn progression_order(&self) -> ProgressionOrder {
        self.progression_order
    }

    /// Common (dy, dx) of all components.
    pub fn uniform_subsampling(&self) -> Result<(u8, u8)> {
        let first = self.components.first().ok_or_else(|| {
            Error::Configuration("codestream declares no components".to_owned())
        })?;

        for (i, component) in self.components.iter().enumerate() {
            if component.dx != first.dx || component.dy != first.dy {
                return Err(Error::MixedSubsampling(format!(
                    "component 0 is subsampled ({}, {}), component {} ({}, {})",
                    first.dy, first.dx, i, component.dy, component.dx
                )));
            }
        }

        Ok((first.dy, first.dx))
    }

    /// (rows, cols) of component `c` after discarding `reduce` resolution
    /// levels, `None` when there is no such component.
    pub fn component_shape(&self, c: usize, reduce: u8) -> Option<(usize, usize)> {
        let component = self.components.get(c)?;

        let rows = reduced_ceil(self.grid_height, component.dy, reduce)
            - reduced_ceil(self.grid_vertical_offset, component.dy, reduce);
        let cols = reduced_ceil(self.grid_width, component.dx, reduce)
            - reduced_ceil(self.grid_horizontal_offset, component.dx, reduce);

        Some((rows as usize, cols as usize))
    }

    /// Reduction giving the lowest resolution thumbnail.
    pub fn thumbnail_reduce(&self) -> u8 {
        self.decomposition_levels
    }

    /// Sample type shared by all components.
    pub fn sample_type(&self) -> Result<SampleType> {
        SampleType::common(
            self.components
                .iter()
                .map(|component| (component.precision, component.signed)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_type() {
        assert_eq!(SampleType::for_precision(1, false).unwrap(), SampleType::U8);
        assert_eq!(SampleType::for_precision(8, true).unwrap(), SampleType::I8);
        assert_eq!(SampleType::for_precision(9, false).unwrap(), SampleType::U16);
        assert_eq!(SampleType::for_precision(16, true).unwrap(), SampleType::I16);
        assert!(matches!(
            SampleType::for_precision(17, false),
            Err(Error::UnsupportedPrecision { precision: 17 })
        ));
    }

    #[test]
    fn test_reduced_ceil() {
        assert_eq!(reduced_ceil(47, 1, 2), 12);
        assert_eq!(reduced_ceil(65, 2, 1), 17);
        assert_eq!(reduced_ceil(0, 1, 5), 0);
        assert_eq!(reduced_ceil(u32::MAX, 255, 255), 1);
    }
}
