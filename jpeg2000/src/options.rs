//! Read and write settings, validated into the parameter objects handed to
//! a [`crate::CodecEngine`].

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use jp2::FileFormat;
use jpc::{CodeBlockStyle, CodingStyle, ProgressionOrder};
use std::fmt;
use std::str::FromStr;

// Size of tcp_rates and tcp_distoratio in the OpenJPEG encoder parameters.
const MAX_LAYERS: usize = 100;

// J2K_MAXRLVLS
const MAX_RESOLUTIONS: u8 = 33;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    Srgb,
    Gray,
}

impl FromStr for Colorspace {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "rgb" | "srgb" => Ok(Colorspace::Srgb),
            "gray" | "grey" => Ok(Colorspace::Gray),
            _ => Err(Error::Configuration(format!(
                "invalid colorspace {:?}",
                value
            ))),
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Colorspace::Srgb => write!(f, "sRGB"),
            Colorspace::Gray => write!(f, "gray"),
        }
    }
}

/// Rate control for successive quality layers.
#[derive(Debug, Clone, PartialEq)]
pub enum QualityLayers {
    /// Compression ratio per layer, 0 meaning lossless.
    Rates(Vec<f32>),
    /// Target PSNR per layer, in dB.
    Psnr(Vec<f32>),
}

impl QualityLayers {
    pub fn len(&self) -> usize {
        match self {
            QualityLayers::Rates(values) | QualityLayers::Psnr(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Validated compression settings.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderParameters {
    pub layers: QualityLayers,
    /// Code-block (height, width).
    pub code_block: Option<(u32, u32)>,
    /// Precinct (height, width) per resolution, finest first.
    pub precincts: Vec<(u32, u32)>,
    pub resolutions: Option<u8>,
    /// Tile (rows, cols).
    pub tile_size: Option<(u32, u32)>,
    pub progression: ProgressionOrder,
    pub code_block_style: CodeBlockStyle,
    pub coding_style: CodingStyle,
    /// Image origin (y, x) on the reference grid.
    pub grid_offset: (u32, u32),
    /// (dy, dx)
    pub subsampling: (u8, u8),
    pub mct: bool,
    /// Explicit for JP2 targets, otherwise derived from the component count.
    pub colorspace: Colorspace,
    pub verbose: bool,
}

impl EncoderParameters {
    /// (y1, x1) of the image area holding `rows` x `cols` samples, the last
    /// sample sitting at offset + (n - 1) * d on the reference grid.
    pub fn image_end(&self, rows: usize, cols: usize) -> Result<(u32, u32)> {
        let end = |samples: usize, offset: u32, d: u8, axis: &str| {
            u32::try_from(samples)
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|n| n.checked_mul(d as u32))
                .and_then(|n| n.checked_add(offset))
                .and_then(|n| n.checked_add(1))
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "{} {} at offset {} subsampled by {} do not fit the reference grid",
                        samples, axis, offset, d
                    ))
                })
        };
        let (y0, x0) = self.grid_offset;
        let (dy, dx) = self.subsampling;

        Ok((end(rows, y0, dy, "rows")?, end(cols, x0, dx, "columns")?))
    }
}

/// Compression settings of [`crate::Jp2k::write`].
///
/// Without any setting the image is written losslessly as a single layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    cratios: Option<Vec<f32>>,
    psnr: Option<Vec<f32>>,
    cbsize: Option<(u32, u32)>,
    psizes: Vec<(u32, u32)>,
    numres: Option<u8>,
    tilesize: Option<(u32, u32)>,
    prog: Option<ProgressionOrder>,
    modesw: u8,
    sop: bool,
    eph: bool,
    grid_offset: Option<(u32, u32)>,
    subsam: Option<(u8, u8)>,
    mct: bool,
    colorspace: Option<Colorspace>,
    verbose: bool,
}

fn check_layers(name: &str, values: &[f32]) -> Result<()> {
    if values.is_empty() || values.len() > MAX_LAYERS {
        return Err(Error::Configuration(format!(
            "{} needs 1 to {} layers, got {}",
            name,
            MAX_LAYERS,
            values.len()
        )));
    }
    if let Some(value) = values.iter().find(|v| !v.is_finite() || **v < 0.0) {
        return Err(Error::Configuration(format!(
            "{} value {} is not a finite non-negative number",
            name, value
        )));
    }
    Ok(())
}

impl WriteOptions {
    pub fn new() -> Self {
        Default::default()
    }

    /// Compression ratio of each quality layer.
    pub fn with_cratios(mut self, cratios: impl Into<Vec<f32>>) -> Self {
        self.cratios = Some(cratios.into());
        self
    }

    /// PSNR of each quality layer.
    pub fn with_psnr(mut self, psnr: impl Into<Vec<f32>>) -> Self {
        self.psnr = Some(psnr.into());
        self
    }

    /// Code-block size (height, width).
    pub fn with_cbsize(mut self, height: u32, width: u32) -> Self {
        self.cbsize = Some((height, width));
        self
    }

    /// Precinct sizes (height, width), finest resolution first.
    pub fn with_psizes(mut self, psizes: impl Into<Vec<(u32, u32)>>) -> Self {
        self.psizes = psizes.into();
        self
    }

    pub fn with_numres(mut self, numres: u8) -> Self {
        self.numres = Some(numres);
        self
    }

    /// Tile size (rows, cols).
    pub fn with_tilesize(mut self, rows: u32, cols: u32) -> Self {
        self.tilesize = Some((rows, cols));
        self
    }

    pub fn with_prog(mut self, prog: ProgressionOrder) -> Self {
        self.prog = Some(prog);
        self
    }

    /// Code-block mode switches, bits of [`CodeBlockStyle`].
    pub fn with_modesw(mut self, modesw: u8) -> Self {
        self.modesw = modesw;
        self
    }

    pub fn with_sop(mut self, sop: bool) -> Self {
        self.sop = sop;
        self
    }

    pub fn with_eph(mut self, eph: bool) -> Self {
        self.eph = eph;
        self
    }

    /// Image origin (y, x) on the reference grid.
    pub fn with_grid_offset(mut self, y: u32, x: u32) -> Self {
        self.grid_offset = Some((y, x));
        self
    }

    /// Subsampling (dy, dx) of every component.
    pub fn with_subsam(mut self, dy: u8, dx: u8) -> Self {
        self.subsam = Some((dy, dx));
        self
    }

    /// Multiple component transform on the first three components.
    pub fn with_mct(mut self, mct: bool) -> Self {
        self.mct = mct;
        self
    }

    pub fn with_colorspace(mut self, colorspace: Colorspace) -> Self {
        self.colorspace = Some(colorspace);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Checks every setting against the target format and component count.
    pub fn validate(&self, format: FileFormat, num_components: usize) -> Result<EncoderParameters> {
        let layers = match (&self.cratios, &self.psnr) {
            (Some(_), Some(_)) => {
                return Err(Error::Configuration(
                    "cannot specify cratios and psnr together".to_owned(),
                ))
            }
            (Some(cratios), None) => {
                check_layers("cratios", cratios)?;
                QualityLayers::Rates(cratios.clone())
            }
            (None, Some(psnr)) => {
                check_layers("psnr", psnr)?;
                QualityLayers::Psnr(psnr.clone())
            }
            // Lossless
            (None, None) => QualityLayers::Rates(vec![0.0]),
        };

        if let Some((height, width)) = self.cbsize {
            if height as u64 * width as u64 > 4096 || height < 4 || width < 4 || height > 1024 || width > 1024 {
                return Err(Error::Configuration(format!(
                    "code block size ({}, {}): area cannot exceed 4096 and each side must be 4 to 1024",
                    height, width
                )));
            }
            if !height.is_power_of_two() || !width.is_power_of_two() {
                return Err(Error::Configuration(format!(
                    "bad code block size ({}, {}), must be powers of 2",
                    height, width
                )));
            }
        }

        if self.psizes.len() > MAX_RESOLUTIONS as usize {
            return Err(Error::Configuration(format!(
                "{} precinct sizes given, at most {} resolutions exist",
                self.psizes.len(),
                MAX_RESOLUTIONS
            )));
        }
        for (j, &(height, width)) in self.psizes.iter().enumerate() {
            if j == 0 {
                if let Some((cb_height, cb_width)) = self.cbsize {
                    if cb_height as u64 * 2 > height as u64 || cb_width as u64 * 2 > width as u64 {
                        return Err(Error::Configuration(format!(
                            "highest resolution precinct size ({}, {}) must be at least twice the code block size ({}, {})",
                            height, width, cb_height, cb_width
                        )));
                    }
                }
            }
            if !height.is_power_of_two() || !width.is_power_of_two() {
                return Err(Error::Configuration(format!(
                    "bad precinct size ({}, {}), must be powers of 2",
                    height, width
                )));
            }
        }

        if let Some(numres) = self.numres {
            if numres == 0 || numres > MAX_RESOLUTIONS {
                return Err(Error::Configuration(format!(
                    "number of resolutions {} outside 1 to {}",
                    numres, MAX_RESOLUTIONS
                )));
            }
        }

        if let Some((rows, cols)) = self.tilesize {
            if rows == 0 || cols == 0 {
                return Err(Error::Configuration(format!(
                    "tile size ({}, {}) must be nonzero",
                    rows, cols
                )));
            }
        }

        let code_block_style = CodeBlockStyle::from_bits(self.modesw).ok_or_else(|| {
            Error::Configuration(format!("mode switch {:#04x} outside 0 to 0x3f", self.modesw))
        })?;

        if let Some((dy, dx)) = self.subsam {
            if dy == 0 || dx == 0 {
                return Err(Error::Configuration(format!(
                    "subsampling ({}, {}) must be nonzero",
                    dy, dx
                )));
            }
        }

        if self.mct && num_components < 3 {
            return Err(Error::Configuration(format!(
                "multiple component transform needs at least 3 components, got {}",
                num_components
            )));
        }

        let colorspace = match (format, self.colorspace) {
            (FileFormat::Codestream, Some(_)) => {
                return Err(Error::Configuration(
                    "do not specify a colorspace with a raw codestream".to_owned(),
                ))
            }
            (FileFormat::Jp2, Some(Colorspace::Srgb)) if num_components < 3 => {
                return Err(Error::Configuration(
                    "RGB colorspace requires at least 3 components".to_owned(),
                ))
            }
            (_, Some(colorspace)) => colorspace,
            (_, None) if num_components < 3 => Colorspace::Gray,
            (_, None) => Colorspace::Srgb,
        };

        let mut coding_style = CodingStyle::empty();
        coding_style.set(CodingStyle::PRECINCTS, !self.psizes.is_empty());
        coding_style.set(CodingStyle::SOP, self.sop);
        coding_style.set(CodingStyle::EPH, self.eph);

        Ok(EncoderParameters {
            layers,
            code_block: self.cbsize,
            precincts: self.psizes.clone(),
            resolutions: self.numres,
            tile_size: self.tilesize,
            progression: self.prog.unwrap_or(ProgressionOrder::Lrcp),
            code_block_style,
            coding_style,
            grid_offset: self.grid_offset.unwrap_or((0, 0)),
            subsampling: self.subsam.unwrap_or((1, 1)),
            mct: self.mct,
            colorspace,
            verbose: self.verbose,
        })
    }
}

/// Resolution reduction of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduce {
    /// Discard this many resolution levels.
    Level(u8),
    /// Lowest resolution the codestream holds.
    Thumbnail,
}

impl Default for Reduce {
    fn default() -> Self {
        Reduce::Level(0)
    }
}

impl TryFrom<i32> for Reduce {
    type Error = Error;

    /// -1 selects the thumbnail.
    fn try_from(value: i32) -> Result<Self> {
        match value {
            -1 => Ok(Reduce::Thumbnail),
            0..=255 => Ok(Reduce::Level(value as u8)),
            _ => Err(Error::Configuration(format!(
                "reduce {} is neither -1 nor a resolution level",
                value
            ))),
        }
    }
}

/// Region of the reference grid to decode, end coordinates exclusive.
/// Every coordinate is at most `i32::MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeArea {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

/// Validated decompression settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderParameters {
    pub reduce: u8,
    /// Quality layers to decode, 0 for all.
    pub layer: u16,
    pub area: Option<DecodeArea>,
    pub tile: Option<u32>,
    pub verbose: bool,
}

/// Decompression settings of [`crate::Jp2k::read`] and
/// [`crate::Jp2k::read_bands`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    reduce: Reduce,
    layer: u16,
    area: Option<(i64, i64, i64, i64)>,
    tile: Option<u32>,
    verbose: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_reduce(mut self, reduce: Reduce) -> Self {
        self.reduce = reduce;
        self
    }

    /// Number of quality layers to decode, 0 for all of them.
    pub fn with_layer(mut self, layer: u16) -> Self {
        self.layer = layer;
        self
    }

    /// (first_row, first_col, last_row, last_col)
    pub fn with_area(mut self, area: (i64, i64, i64, i64)) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_tile(mut self, tile: u32) -> Self {
        self.tile = Some(tile);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn reduce(&self) -> Reduce {
        self.reduce
    }

    /// Checks the settings against the layout of the file to read.
    ///
    /// Only the area is checked here. Reduction, layer and tile selection
    /// are left to the engine, whose failure is reported as is.
    pub fn validate(&self, geometry: &Geometry) -> Result<DecoderParameters> {
        let reduce = match self.reduce {
            Reduce::Thumbnail => geometry.thumbnail_reduce(),
            Reduce::Level(level) => level,
        };

        let area = match self.area {
            Some((first_row, first_col, last_row, last_col)) => {
                if first_row < 0 || first_col < 0 {
                    return Err(Error::DecodeArea(format!(
                        "upper left corner coordinates must be nonnegative: {:?}",
                        (first_row, first_col, last_row, last_col)
                    )));
                }
                if last_row <= 0 || last_col <= 0 {
                    return Err(Error::DecodeArea(format!(
                        "lower right corner coordinates must be positive: {:?}",
                        (first_row, first_col, last_row, last_col)
                    )));
                }
                if first_row >= last_row || first_col >= last_col {
                    return Err(Error::DecodeArea(format!(
                        "upper left corner must precede the lower right corner: {:?}",
                        (first_row, first_col, last_row, last_col)
                    )));
                }
                // Engines take signed 32 bit coordinates
                let coordinate = |value: i64| {
                    i32::try_from(value).map(|value| value as u32).map_err(|_| {
                        Error::DecodeArea(format!("coordinate {} exceeds the reference grid", value))
                    })
                };
                Some(DecodeArea {
                    x0: coordinate(first_col)?,
                    y0: coordinate(first_row)?,
                    x1: coordinate(last_col)?,
                    y1: coordinate(last_row)?,
                })
            }
            None => None,
        };

        Ok(DecoderParameters {
            reduce,
            layer: self.layer,
            area,
            tile: self.tile,
            verbose: self.verbose,
        })
    }
}
