use bitflags::bitflags;
use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::io::prelude::*;
use std::str;
use std::str::FromStr;
use thiserror::Error;

pub type MarkerSymbol = [u8; 2];

fn marker_hex(marker: &MarkerSymbol) -> String {
    format!("0x{:02X}{:02X}", marker[0], marker[1])
}

#[derive(Debug, Error)]
pub enum CodestreamError {
    #[error("marker {} at byte offset {offset}: {error}", marker_hex(.marker))]
    MarkerError {
        marker: MarkerSymbol,
        offset: u64,
        error: String,
    },
    #[error("missing marker {}", marker_hex(.marker))]
    MarkerMissing { marker: MarkerSymbol },
    #[error("unexpected marker {} at byte offset {offset}", marker_hex(.marker))]
    MarkerUnexpected { marker: MarkerSymbol, offset: u64 },
    // XTsiz + XTOsiz > XOsiz
    // YTsiz + YTOsiz > YOsiz
    #[error(
        "tile size overflow: XOsiz = {image_horizontal_offset}, YOsiz = {image_vertical_offset}, \
         XTOsiz = {tile_horizontal_offset}, YTOsiz = {tile_vertical_offset}, \
         XTsiz = {reference_tile_width}, YTsiz = {reference_tile_height}"
    )]
    TileSizeOverflow {
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        reference_tile_width: u32,
        reference_tile_height: u32,
    },
    #[error(
        "tile grid offset overflow: XOsiz = {image_horizontal_offset}, YOsiz = {image_vertical_offset}, \
         XTOsiz = {tile_horizontal_offset}, YTOsiz = {tile_vertical_offset}"
    )]
    TileGridOffsetOverflow {
        tile_horizontal_offset: u32,
        tile_vertical_offset: u32,
        image_horizontal_offset: u32,
        image_vertical_offset: u32,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

// Delimiting markers and marker segments
pub const MARKER_SYMBOL_SOC: MarkerSymbol = [255, 79]; // Start of codestream
pub const MARKER_SYMBOL_SOT: MarkerSymbol = [255, 144]; // Start of tile-part
pub const MARKER_SYMBOL_SOD: MarkerSymbol = [255, 147]; // Start of data
pub const MARKER_SYMBOL_EOC: MarkerSymbol = [255, 217]; // End of codestream

// Fixed information marker segments
pub const MARKER_SYMBOL_SIZ: MarkerSymbol = [255, 81]; // Image and tile size

// Functional marker segments
pub const MARKER_SYMBOL_COD: MarkerSymbol = [255, 82]; // Coding style default
pub const MARKER_SYMBOL_COC: MarkerSymbol = [255, 83]; // Coding style component
pub const MARKER_SYMBOL_RGN: MarkerSymbol = [255, 94]; // Region-of-interest
pub const MARKER_SYMBOL_QCD: MarkerSymbol = [255, 92]; // Quantization default
pub const MARKER_SYMBOL_QCC: MarkerSymbol = [255, 93]; // Quantization component
pub const MARKER_SYMBOL_POC: MarkerSymbol = [255, 95]; // Progression order change

// Pointer marker segments
pub const MARKER_SYMBOL_TLM: MarkerSymbol = [255, 85]; // Tile-part lengths
pub const MARKER_SYMBOL_PLM: MarkerSymbol = [255, 87]; // Packet length, main header
pub const MARKER_SYMBOL_PLT: MarkerSymbol = [255, 88]; // Packet length, tile-part header
pub const MARKER_SYMBOL_PPM: MarkerSymbol = [255, 96]; // Packed packet headers, main header
pub const MARKER_SYMBOL_PPT: MarkerSymbol = [255, 97]; // Packed packet headers, tile-part header

// In bit stream markers and marker segments
pub const MARKER_SYMBOL_SOP: MarkerSymbol = [255, 145]; // Start of packet
pub const MARKER_SYMBOL_EPH: MarkerSymbol = [255, 146]; // End of packet header

// Informational marker segments
pub const MARKER_SYMBOL_CRG: MarkerSymbol = [255, 99]; // Component registration
pub const MARKER_SYMBOL_COM: MarkerSymbol = [255, 100]; // Comment

const KNOWN_MARKERS: [MarkerSymbol; 20] = [
    MARKER_SYMBOL_SOC,
    MARKER_SYMBOL_SOT,
    MARKER_SYMBOL_SOD,
    MARKER_SYMBOL_EOC,
    MARKER_SYMBOL_SIZ,
    MARKER_SYMBOL_COD,
    MARKER_SYMBOL_COC,
    MARKER_SYMBOL_RGN,
    MARKER_SYMBOL_QCD,
    MARKER_SYMBOL_QCC,
    MARKER_SYMBOL_POC,
    MARKER_SYMBOL_TLM,
    MARKER_SYMBOL_PLM,
    MARKER_SYMBOL_PLT,
    MARKER_SYMBOL_PPM,
    MARKER_SYMBOL_PPT,
    MARKER_SYMBOL_SOP,
    MARKER_SYMBOL_EPH,
    MARKER_SYMBOL_CRG,
    MARKER_SYMBOL_COM,
];

// 0xFF30 to 0xFF3F are reserved and carry no parameters (A.1.4).
fn is_reserved_without_length(marker: MarkerSymbol) -> bool {
    marker[0] == 0xFF && (0x30..=0x3F).contains(&marker[1])
}

fn is_known(marker: MarkerSymbol) -> bool {
    KNOWN_MARKERS.contains(&marker)
}

/// Short mnemonic of a marker, `"unknown"` for codes this parser does not
/// decode.
pub fn marker_name(marker: MarkerSymbol) -> &'static str {
    match marker {
        MARKER_SYMBOL_SOC => "SOC",
        MARKER_SYMBOL_SOT => "SOT",
        MARKER_SYMBOL_SOD => "SOD",
        MARKER_SYMBOL_EOC => "EOC",
        MARKER_SYMBOL_SIZ => "SIZ",
        MARKER_SYMBOL_COD => "COD",
        MARKER_SYMBOL_COC => "COC",
        MARKER_SYMBOL_RGN => "RGN",
        MARKER_SYMBOL_QCD => "QCD",
        MARKER_SYMBOL_QCC => "QCC",
        MARKER_SYMBOL_POC => "POC",
        MARKER_SYMBOL_TLM => "TLM",
        MARKER_SYMBOL_PLM => "PLM",
        MARKER_SYMBOL_PLT => "PLT",
        MARKER_SYMBOL_PPM => "PPM",
        MARKER_SYMBOL_PPT => "PPT",
        MARKER_SYMBOL_SOP => "SOP",
        MARKER_SYMBOL_EPH => "EPH",
        MARKER_SYMBOL_CRG => "CRG",
        MARKER_SYMBOL_COM => "COM",
        _ => "unknown",
    }
}

// Table A.16 - Progression order for the SGcod, SPcoc, and Ppoc parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionOrder {
    // 0000 0000 Layer-resolution level-component-position progression
    Lrcp,

    // 0000 0001 Resolution level-layer-component-position progression
    Rlcp,

    // 0000 0010 Resolution level-position-component-layer progression
    Rpcl,

    // 0000 0011 Position-component-resolution level-layer progression
    Pcrl,

    // 0000 0100 Component-position-resolution level-layer progression
    Cprl,

    // All other values reserved
    Reserved { value: u8 },
}

impl ProgressionOrder {
    pub fn new(value: u8) -> ProgressionOrder {
        match value {
            0b0000_0000 => ProgressionOrder::Lrcp,
            0b0000_0001 => ProgressionOrder::Rlcp,
            0b0000_0010 => ProgressionOrder::Rpcl,
            0b0000_0011 => ProgressionOrder::Pcrl,
            0b0000_0100 => ProgressionOrder::Cprl,
            _ => ProgressionOrder::Reserved { value },
        }
    }

    pub fn value(&self) -> u8 {
        match self {
            ProgressionOrder::Lrcp => 0,
            ProgressionOrder::Rlcp => 1,
            ProgressionOrder::Rpcl => 2,
            ProgressionOrder::Pcrl => 3,
            ProgressionOrder::Cprl => 4,
            ProgressionOrder::Reserved { value } => *value,
        }
    }
}

impl fmt::Display for ProgressionOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ProgressionOrder::Lrcp => write!(f, "LRCP"),
            ProgressionOrder::Rlcp => write!(f, "RLCP"),
            ProgressionOrder::Rpcl => write!(f, "RPCL"),
            ProgressionOrder::Pcrl => write!(f, "PCRL"),
            ProgressionOrder::Cprl => write!(f, "CPRL"),
            ProgressionOrder::Reserved { value } => write!(f, "reserved ({})", value),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown progression order {0:?}, expected one of LRCP, RLCP, RPCL, PCRL, CPRL")]
pub struct ParseProgressionOrderError(String);

impl FromStr for ProgressionOrder {
    type Err = ParseProgressionOrderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "LRCP" => Ok(ProgressionOrder::Lrcp),
            "RLCP" => Ok(ProgressionOrder::Rlcp),
            "RPCL" => Ok(ProgressionOrder::Rpcl),
            "PCRL" => Ok(ProgressionOrder::Pcrl),
            "CPRL" => Ok(ProgressionOrder::Cprl),
            _ => Err(ParseProgressionOrderError(value.to_owned())),
        }
    }
}

bitflags! {
    /// Scod and Scoc flags (Table A.13).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CodingStyle: u8 {
        // xxxx xxx1 Entropy coder with precincts defined in SPcod/SPcoc
        const PRECINCTS = 0b0000_0001;
        // xxxx xx1x SOP marker segments may be used
        const SOP = 0b0000_0010;
        // xxxx x1xx EPH marker may be used
        const EPH = 0b0000_0100;
    }
}

bitflags! {
    /// Style of the code-block coding passes (Table A.19).
    ///
    /// Encoders usually call these the mode switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CodeBlockStyle: u8 {
        // Selective arithmetic coding bypass
        const BYPASS = 0b0000_0001;
        // Reset context probabilities on coding pass boundaries
        const RESET = 0b0000_0010;
        // Termination on each coding pass
        const TERMINATE_ALL = 0b0000_0100;
        // Vertically causal context
        const VERTICALLY_CAUSAL = 0b0000_1000;
        // Predictable termination
        const PREDICTABLE_TERMINATION = 0b0001_0000;
        // Segmentation symbols are used
        const SEGMENTATION_SYMBOLS = 0b0010_0000;
    }
}

// Table A.17 - Multiple component transformation for the SGcod parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipleComponentTransformation {
    None,

    // Transformation on components 0, 1 and 2. Irreversible with the 9-7
    // filter, reversible with the 5-3 filter.
    Multiple,

    Reserved { value: u8 },
}

impl MultipleComponentTransformation {
    fn new(value: u8) -> MultipleComponentTransformation {
        match value {
            0 => MultipleComponentTransformation::None,
            1 => MultipleComponentTransformation::Multiple,
            _ => MultipleComponentTransformation::Reserved { value },
        }
    }
}

// Table A.20 - Transformation for the SPcod and SPcoc parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformationFilter {
    // 9-7 irreversible filter
    Irreversible,
    // 5-3 reversible filter
    Reversible,
    Reserved { value: u8 },
}

impl TransformationFilter {
    fn new(value: u8) -> TransformationFilter {
        match value {
            0 => TransformationFilter::Irreversible,
            1 => TransformationFilter::Reversible,
            _ => TransformationFilter::Reserved { value },
        }
    }
}

impl fmt::Display for TransformationFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransformationFilter::Irreversible => write!(f, "9-7 irreversible"),
            TransformationFilter::Reversible => write!(f, "5-3 reversible"),
            TransformationFilter::Reserved { value } => write!(f, "reserved ({})", value),
        }
    }
}

macro_rules! segment_position {
    ($($segment:ty),* $(,)?) => {
        $(
            impl $segment {
                /// Byte offset of the marker code.
                pub fn offset(&self) -> u64 {
                    self.offset
                }

                /// Segment length, including the length field itself.
                pub fn length(&self) -> u16 {
                    self.length
                }
            }
        )*
    };
}

segment_position!(
    ImageAndTileSizeMarkerSegment,
    CodingStyleMarkerSegment,
    CodingStyleComponentSegment,
    QuantizationDefaultMarkerSegment,
    QuantizationComponentSegment,
    RegionOfInterestSegment,
    ProgressionOrderChangeSegment,
    TilePartLengthsSegment,
    PacketLengthSegment,
    TilePacketLengthSegment,
    PackedPacketHeaderSegment,
    TilePackedPacketHeaderSegment,
    ComponentRegistrationSegment,
    CommentMarkerSegment,
    StartOfTileSegment,
    UnknownSegment,
);

// A.5.1
//
// Image and tile size (SIZ)
//
// Width and height of the reference grid, the tiling of that grid, and the
// depth and sample separation of every component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageAndTileSizeMarkerSegment {
    offset: u64,
    length: u16,

    // Rsiz: capabilities a decoder needs to decode the codestream.
    decoder_capabilities: [u8; 2],

    // Xsiz, Ysiz
    reference_grid_width: [u8; 4],
    reference_grid_height: [u8; 4],

    // XOsiz, YOsiz: offset of the image area on the reference grid.
    image_horizontal_offset: [u8; 4],
    image_vertical_offset: [u8; 4],

    // XTsiz, YTsiz
    reference_tile_width: [u8; 4],
    reference_tile_height: [u8; 4],

    // XTOsiz, YTOsiz: offset of the first tile on the reference grid.
    tile_horizontal_offset: [u8; 4],
    tile_vertical_offset: [u8; 4],

    // Csiz
    no_components: [u8; 2],

    components: Vec<ComponentSize>,
}

/// Ssiz, XRsiz and YRsiz of one component.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentSize {
    precision: [u8; 1],
    horizontal_separation: [u8; 1],
    vertical_separation: [u8; 1],
}

impl ComponentSize {
    /// Bit depth of the component samples.
    pub fn precision(&self) -> u8 {
        // Table A.11, the low 7 bits hold the depth minus one.
        (self.precision[0] & 0x7f) + 1
    }

    pub fn values_are_signed(&self) -> bool {
        self.precision[0] & 0x80 == 0x80
    }

    /// XRsiz
    pub fn horizontal_separation(&self) -> u8 {
        self.horizontal_separation[0]
    }

    /// YRsiz
    pub fn vertical_separation(&self) -> u8 {
        self.vertical_separation[0]
    }
}

impl ImageAndTileSizeMarkerSegment {
    pub fn decoder_capabilities(&self) -> u16 {
        u16::from_be_bytes(self.decoder_capabilities)
    }

    pub fn reference_grid_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_width)
    }
    pub fn reference_grid_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_grid_height)
    }

    pub fn image_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_horizontal_offset)
    }
    pub fn image_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.image_vertical_offset)
    }

    pub fn reference_tile_width(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_width)
    }
    pub fn reference_tile_height(&self) -> u32 {
        u32::from_be_bytes(self.reference_tile_height)
    }

    pub fn tile_horizontal_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_horizontal_offset)
    }
    pub fn tile_vertical_offset(&self) -> u32 {
        u32::from_be_bytes(self.tile_vertical_offset)
    }

    pub fn no_components(&self) -> u16 {
        u16::from_be_bytes(self.no_components)
    }

    pub fn components(&self) -> &[ComponentSize] {
        &self.components
    }

    pub fn component(&self, i: usize) -> Option<&ComponentSize> {
        self.components.get(i)
    }

    // numXtiles = ceil((Xsiz - XTOsiz) / XTsiz)
    pub fn num_x_tiles(&self) -> u32 {
        (self.reference_grid_width() - self.tile_horizontal_offset())
            .div_ceil(self.reference_tile_width())
    }

    // numYtiles = ceil((Ysiz - YTOsiz) / YTsiz)
    pub fn num_y_tiles(&self) -> u32 {
        (self.reference_grid_height() - self.tile_vertical_offset())
            .div_ceil(self.reference_tile_height())
    }
}

// A.6.1
//
// Coding style default (COD)
//
// Coding style, decomposition levels and layering used for every component
// of the image (main header) or of a tile (tile-part header), unless a COC
// overrides it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodingStyleMarkerSegment {
    offset: u64,
    length: u16,

    // Scod
    coding_style: [u8; 1],

    // SGcod: progression order, number of layers, multiple component
    // transformation
    progression_order: [u8; 1],
    no_layers: [u8; 2],
    multiple_component_transformation: [u8; 1],

    // SPcod
    coding_style_parameters: CodingStyleParameters,
}

impl CodingStyleMarkerSegment {
    pub fn coding_style(&self) -> u8 {
        self.coding_style[0]
    }

    pub fn coding_styles(&self) -> CodingStyle {
        CodingStyle::from_bits_truncate(self.coding_style[0])
    }

    pub fn progression_order(&self) -> ProgressionOrder {
        ProgressionOrder::new(self.progression_order[0])
    }

    pub fn no_layers(&self) -> u16 {
        u16::from_be_bytes(self.no_layers)
    }

    pub fn multiple_component_transformation(&self) -> MultipleComponentTransformation {
        MultipleComponentTransformation::new(self.multiple_component_transformation[0])
    }

    pub fn coding_style_parameters(&self) -> &CodingStyleParameters {
        &self.coding_style_parameters
    }
}

// A.6.2
//
// Coding style component (COC)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodingStyleComponentSegment {
    offset: u64,
    length: u16,

    // Ccoc
    index: u16,

    // Scoc
    coding_style: [u8; 1],

    // SPcoc
    coding_style_parameters: CodingStyleParameters,
}

impl CodingStyleComponentSegment {
    pub fn component_index(&self) -> u16 {
        self.index
    }

    pub fn coding_styles(&self) -> CodingStyle {
        CodingStyle::from_bits_truncate(self.coding_style[0])
    }

    pub fn coding_style_parameters(&self) -> &CodingStyleParameters {
        &self.coding_style_parameters
    }
}

/// PPx and PPy exponents of one resolution level.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PrecinctSize {
    value: u8,
}

impl PrecinctSize {
    // 4 LSBs are the precinct width exponent PPx
    pub fn width_exponent(&self) -> u8 {
        self.value & 0x0f
    }

    // 4 MSBs are the precinct height exponent PPy
    pub fn height_exponent(&self) -> u8 {
        self.value >> 4
    }

    pub fn width(&self) -> u32 {
        1 << self.width_exponent()
    }

    pub fn height(&self) -> u32 {
        1 << self.height_exponent()
    }
}

// Table A.15 - Coding style parameter values of the SPcod and SPcoc parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodingStyleParameters {
    coding_style: [u8; 1],

    // Number of decomposition levels, NL. Zero implies no transformation.
    no_decomposition_levels: [u8; 1],

    // Code-block width and height exponent offset values, xcb and ycb
    code_block_width: [u8; 1],
    code_block_height: [u8; 1],

    code_block_style: [u8; 1],

    transformation: [u8; 1],

    // Only present when Scod or Scoc has the precinct bit set; the first
    // entry belongs to the NLLL subband.
    precinct_size: Vec<u8>,
}

impl CodingStyleParameters {
    pub fn no_decomposition_levels(&self) -> u8 {
        self.no_decomposition_levels[0]
    }

    // Code-block width exponent xcb = value + 2
    pub fn code_block_width(&self) -> u16 {
        1 << ((self.code_block_width[0] & 0x0f) + 2)
    }

    pub fn code_block_height(&self) -> u16 {
        1 << ((self.code_block_height[0] & 0x0f) + 2)
    }

    pub fn code_block_style(&self) -> u8 {
        self.code_block_style[0]
    }

    pub fn coding_block_styles(&self) -> CodeBlockStyle {
        CodeBlockStyle::from_bits_truncate(self.code_block_style[0])
    }

    pub fn transformation(&self) -> TransformationFilter {
        TransformationFilter::new(self.transformation[0])
    }

    pub fn has_defined_precinct_size(&self) -> bool {
        self.coding_style[0] & CodingStyle::PRECINCTS.bits() != 0
    }

    /// Precinct sizes from the lowest resolution up. Without explicit
    /// precincts every resolution uses PPx = PPy = 15.
    pub fn precinct_sizes(&self) -> Vec<PrecinctSize> {
        if !self.has_defined_precinct_size() {
            return vec![PrecinctSize { value: 0xff }; self.no_decomposition_levels() as usize + 1];
        }

        self.precinct_size
            .iter()
            .map(|value| PrecinctSize { value: *value })
            .collect()
    }
}

// A.6.3
//
// Region of interest (RGN)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionOfInterestSegment {
    offset: u64,
    length: u16,

    // Crgn
    component_index: u16,

    // Srgn: 0 is the implicit ROI (maximum shift), other values are reserved
    region_of_interest_style: [u8; 1],

    // SPrgn: binary shifting of the ROI coefficients
    region_of_interest_style_parameter: [u8; 1],
}

impl RegionOfInterestSegment {
    pub fn component_index(&self) -> u16 {
        self.component_index
    }

    pub fn style(&self) -> u8 {
        self.region_of_interest_style[0]
    }

    pub fn shift(&self) -> u8 {
        self.region_of_interest_style_parameter[0]
    }
}

// A.6.6
//
// Progression order change (POC)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressionOrderChangeSegment {
    offset: u64,
    length: u16,

    progressions: Vec<ProgressionOrderChange>,
}

impl ProgressionOrderChangeSegment {
    pub fn progressions(&self) -> &[ProgressionOrderChange] {
        &self.progressions
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressionOrderChange {
    // RSpoc: resolution level index (inclusive) for the start of a progression
    resolution_level_index_start: u8,

    // CSpoc: component index (inclusive) for the start of a progression
    component_index_start: u16,

    // LYEpoc: layer index (exclusive) for the end of a progression
    layer_index_end: u16,

    // REpoc: resolution level index (exclusive) for the end of a progression
    resolution_level_index_end: u8,

    // CEpoc: component index (exclusive) for the end of a progression
    component_index_end: u16,

    // Ppoc
    progression_order: u8,
}

impl ProgressionOrderChange {
    pub fn resolution_level_index_start(&self) -> u8 {
        self.resolution_level_index_start
    }

    pub fn component_index_start(&self) -> u16 {
        self.component_index_start
    }

    pub fn layer_index_end(&self) -> u16 {
        self.layer_index_end
    }

    pub fn resolution_level_index_end(&self) -> u8 {
        self.resolution_level_index_end
    }

    pub fn component_index_end(&self) -> u16 {
        self.component_index_end
    }

    pub fn progression_order(&self) -> ProgressionOrder {
        ProgressionOrder::new(self.progression_order)
    }
}

// A.7.1
//
// Tile-part lengths (TLM)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TilePartLengthsSegment {
    offset: u64,
    length: u16,

    // Ztlm
    index: u8,

    // Stlm: size of the Ttlm and Ptlm parameters
    parameter_sizes: u8,

    tile_part_lengths: Vec<TilePartLength>,
}

impl TilePartLengthsSegment {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn tile_part_lengths(&self) -> &[TilePartLength] {
        &self.tile_part_lengths
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TilePartLength {
    // Ttlm, absent when the tile-parts are in tile order with one tile-part
    // per tile.
    tile_index: Option<u16>,

    // Ptlm, same value as Psot of the matching SOT.
    tile_part_length: u32,
}

impl TilePartLength {
    pub fn tile_index(&self) -> Option<u16> {
        self.tile_index
    }

    pub fn tile_part_length(&self) -> u32 {
        self.tile_part_length
    }
}

// A.7.2
//
// Packet length, main header (PLM)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketLengthSegment {
    offset: u64,
    length: u16,

    // Zplm
    index: u8,

    // One list of Iplm values per Nplm entry, in tile-part order.
    tile_parts: Vec<Vec<u32>>,
}

impl PacketLengthSegment {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn packet_lengths(&self) -> &[Vec<u32>] {
        &self.tile_parts
    }
}

// A.7.3
//
// Packet length, tile-part header (PLT)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TilePacketLengthSegment {
    offset: u64,
    length: u16,

    // Zplt
    index: u8,

    // Iplt
    packet_lengths: Vec<u32>,
}

impl TilePacketLengthSegment {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn packet_lengths(&self) -> &[u32] {
        &self.packet_lengths
    }
}

// A.7.4
//
// Packed packet headers, main header (PPM)
//
// Nppm/Ippm series may continue across segments, so the data is kept as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedPacketHeaderSegment {
    offset: u64,
    length: u16,

    // Zppm
    index: u8,

    data: Vec<u8>,
}

impl PackedPacketHeaderSegment {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

// A.7.5
//
// Packed packet headers, tile-part header (PPT)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TilePackedPacketHeaderSegment {
    offset: u64,
    length: u16,

    // Zppt
    index: u8,

    // Ippt
    data: Vec<u8>,
}

impl TilePackedPacketHeaderSegment {
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

// A.9.1
//
// Component registration (CRG)
//
// Offsets in units of 1/65536 of XRsiz and YRsiz. No effect on decoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComponentRegistrationSegment {
    offset: u64,
    length: u16,

    // Xcrg, Ycrg per component
    registrations: Vec<(u16, u16)>,
}

impl ComponentRegistrationSegment {
    pub fn registrations(&self) -> &[(u16, u16)] {
        &self.registrations
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommentRegistrationValue {
    // General use (binary values)
    Binary,

    // General use (ISO 8859-15:1999 (Latin) values)
    Latin,

    Reserved { value: u16 },
}

impl CommentRegistrationValue {
    fn new(value: u16) -> CommentRegistrationValue {
        // Table A.44
        match value {
            0 => CommentRegistrationValue::Binary,
            1 => CommentRegistrationValue::Latin,
            _ => CommentRegistrationValue::Reserved { value },
        }
    }
}

// A.9.2
//
// Comment (COM)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentMarkerSegment {
    offset: u64,
    length: u16,

    // Rcom
    registration_value: [u8; 2],

    // Ccom
    comment: Vec<u8>,
}

impl CommentMarkerSegment {
    pub fn registration_value(&self) -> CommentRegistrationValue {
        CommentRegistrationValue::new(u16::from_be_bytes(self.registration_value))
    }

    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    pub fn comment_utf8(&self) -> Result<&str, str::Utf8Error> {
        str::from_utf8(&self.comment)
    }
}

// Table A.28 - Quantization default values for the Sqcd and Sqcc parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantizationStyle {
    No { guard: u8 },
    ScalarDerived { guard: u8 },
    ScalarExpounded { guard: u8 },
    Reserved { value: u8 },
}

impl QuantizationStyle {
    fn new(byte: u8) -> QuantizationStyle {
        // 000x xxxx to 111x xxxx, number of guard bits: 0 to 7
        let guard = byte >> 5;

        match byte & 0b0001_1111 {
            0b0000_0000 => QuantizationStyle::No { guard },
            // Values signalled for the NLLL subband only
            0b0000_0001 => QuantizationStyle::ScalarDerived { guard },
            // Values signalled for each subband
            0b0000_0010 => QuantizationStyle::ScalarExpounded { guard },
            _ => QuantizationStyle::Reserved { value: byte },
        }
    }

    pub fn guard_bits(&self) -> Option<u8> {
        match self {
            QuantizationStyle::No { guard }
            | QuantizationStyle::ScalarDerived { guard }
            | QuantizationStyle::ScalarExpounded { guard } => Some(*guard),
            QuantizationStyle::Reserved { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantizationValue {
    // Table A.29, exponent in the 5 MSBs
    Reversible { value: u8 },
    // Table A.30, 5 bit exponent and 11 bit mantissa
    Irreversible { value: u16 },
}

impl QuantizationValue {
    pub fn exponent(&self) -> u8 {
        match self {
            QuantizationValue::Reversible { value } => value >> 3,
            QuantizationValue::Irreversible { value } => (value >> 11) as u8,
        }
    }

    pub fn mantissa(&self) -> u16 {
        match self {
            QuantizationValue::Reversible { .. } => 0,
            QuantizationValue::Irreversible { value } => value & 0x07ff,
        }
    }
}

// A.6.4
//
// Quantization default (QCD)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantizationDefaultMarkerSegment {
    offset: u64,
    length: u16,

    // Sqcd
    quantization_style: [u8; 1],

    // SPqcd, one per subband
    values: Vec<QuantizationValue>,
}

impl QuantizationDefaultMarkerSegment {
    pub fn quantization_style_u8(&self) -> u8 {
        self.quantization_style[0]
    }

    pub fn quantization_style(&self) -> QuantizationStyle {
        QuantizationStyle::new(self.quantization_style[0])
    }

    pub fn quantization_values(&self) -> &[QuantizationValue] {
        &self.values
    }

    pub fn quantization_exponents(&self) -> Vec<u8> {
        self.values.iter().map(|e| e.exponent()).collect()
    }
}

// A.6.5
//
// Quantization component (QCC)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantizationComponentSegment {
    offset: u64,
    length: u16,

    // Cqcc
    component_index: u16,

    // Sqcc
    quantization_style: [u8; 1],

    // SPqcc
    values: Vec<QuantizationValue>,
}

impl QuantizationComponentSegment {
    pub fn component_index(&self) -> u16 {
        self.component_index
    }

    pub fn quantization_style(&self) -> QuantizationStyle {
        QuantizationStyle::new(self.quantization_style[0])
    }

    pub fn quantization_values(&self) -> &[QuantizationValue] {
        &self.values
    }
}

// A.4.2
//
// Start of tile-part (SOT)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartOfTileSegment {
    offset: u64,
    length: u16,

    // Isot: tile index in raster order
    tile_index: [u8; 2],

    // Psot: bytes from the first byte of this SOT to the end of the tile-part
    // data. Zero means the tile-part runs up to the EOC marker.
    tile_length: [u8; 4],

    // TPsot
    tile_part_index: [u8; 1],

    // TNsot: zero when the number of tile-parts is not given here
    no_tile_parts: [u8; 1],
}

impl StartOfTileSegment {
    pub fn tile_index(&self) -> u16 {
        u16::from_be_bytes(self.tile_index)
    }

    pub fn tile_length(&self) -> u32 {
        u32::from_be_bytes(self.tile_length)
    }

    pub fn tile_part_index(&self) -> u8 {
        self.tile_part_index[0]
    }

    pub fn no_tile_parts(&self) -> u8 {
        self.no_tile_parts[0]
    }
}

/// A marker this parser does not decode, skipped using its length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnknownSegment {
    marker: MarkerSymbol,
    offset: u64,
    length: u16,
}

impl UnknownSegment {
    pub fn marker(&self) -> MarkerSymbol {
        self.marker
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Soc { offset: u64 },
    Siz(ImageAndTileSizeMarkerSegment),
    Cod(CodingStyleMarkerSegment),
    Coc(CodingStyleComponentSegment),
    Qcd(QuantizationDefaultMarkerSegment),
    Qcc(QuantizationComponentSegment),
    Rgn(RegionOfInterestSegment),
    Poc(ProgressionOrderChangeSegment),
    Tlm(TilePartLengthsSegment),
    Plm(PacketLengthSegment),
    Plt(TilePacketLengthSegment),
    Ppm(PackedPacketHeaderSegment),
    Ppt(TilePackedPacketHeaderSegment),
    Crg(ComponentRegistrationSegment),
    Com(CommentMarkerSegment),
    Sot(StartOfTileSegment),
    Sod { offset: u64 },
    Eoc { offset: u64 },
    Unknown(UnknownSegment),
}

impl Segment {
    pub fn marker(&self) -> MarkerSymbol {
        match self {
            Segment::Soc { .. } => MARKER_SYMBOL_SOC,
            Segment::Siz(_) => MARKER_SYMBOL_SIZ,
            Segment::Cod(_) => MARKER_SYMBOL_COD,
            Segment::Coc(_) => MARKER_SYMBOL_COC,
            Segment::Qcd(_) => MARKER_SYMBOL_QCD,
            Segment::Qcc(_) => MARKER_SYMBOL_QCC,
            Segment::Rgn(_) => MARKER_SYMBOL_RGN,
            Segment::Poc(_) => MARKER_SYMBOL_POC,
            Segment::Tlm(_) => MARKER_SYMBOL_TLM,
            Segment::Plm(_) => MARKER_SYMBOL_PLM,
            Segment::Plt(_) => MARKER_SYMBOL_PLT,
            Segment::Ppm(_) => MARKER_SYMBOL_PPM,
            Segment::Ppt(_) => MARKER_SYMBOL_PPT,
            Segment::Crg(_) => MARKER_SYMBOL_CRG,
            Segment::Com(_) => MARKER_SYMBOL_COM,
            Segment::Sot(_) => MARKER_SYMBOL_SOT,
            Segment::Sod { .. } => MARKER_SYMBOL_SOD,
            Segment::Eoc { .. } => MARKER_SYMBOL_EOC,
            Segment::Unknown(segment) => segment.marker,
        }
    }

    pub fn name(&self) -> &'static str {
        marker_name(self.marker())
    }

    pub fn offset(&self) -> u64 {
        match self {
            Segment::Soc { offset } | Segment::Sod { offset } | Segment::Eoc { offset } => *offset,
            Segment::Siz(segment) => segment.offset,
            Segment::Cod(segment) => segment.offset,
            Segment::Coc(segment) => segment.offset,
            Segment::Qcd(segment) => segment.offset,
            Segment::Qcc(segment) => segment.offset,
            Segment::Rgn(segment) => segment.offset,
            Segment::Poc(segment) => segment.offset,
            Segment::Tlm(segment) => segment.offset,
            Segment::Plm(segment) => segment.offset,
            Segment::Plt(segment) => segment.offset,
            Segment::Ppm(segment) => segment.offset,
            Segment::Ppt(segment) => segment.offset,
            Segment::Crg(segment) => segment.offset,
            Segment::Com(segment) => segment.offset,
            Segment::Sot(segment) => segment.offset,
            Segment::Unknown(segment) => segment.offset,
        }
    }

    /// Declared segment length, 0 for markers without parameters.
    pub fn length(&self) -> u16 {
        match self {
            Segment::Soc { .. } | Segment::Sod { .. } | Segment::Eoc { .. } => 0,
            Segment::Siz(segment) => segment.length,
            Segment::Cod(segment) => segment.length,
            Segment::Coc(segment) => segment.length,
            Segment::Qcd(segment) => segment.length,
            Segment::Qcc(segment) => segment.length,
            Segment::Rgn(segment) => segment.length,
            Segment::Poc(segment) => segment.length,
            Segment::Tlm(segment) => segment.length,
            Segment::Plm(segment) => segment.length,
            Segment::Plt(segment) => segment.length,
            Segment::Ppm(segment) => segment.length,
            Segment::Ppt(segment) => segment.length,
            Segment::Crg(segment) => segment.length,
            Segment::Com(segment) => segment.length,
            Segment::Sot(segment) => segment.length,
            Segment::Unknown(segment) => segment.length,
        }
    }
}

fn write_coding_style_parameters(
    f: &mut fmt::Formatter,
    parameters: &CodingStyleParameters,
) -> fmt::Result {
    writeln!(
        f,
        "    Wavelet transform: {}",
        parameters.transformation()
    )?;
    writeln!(
        f,
        "    Decomposition levels: {}",
        parameters.no_decomposition_levels()
    )?;
    writeln!(
        f,
        "    Code block height, width: ({} x {})",
        parameters.code_block_height(),
        parameters.code_block_width()
    )?;
    let precincts: Vec<String> = parameters
        .precinct_sizes()
        .iter()
        .map(|p| format!("({}, {})", p.height(), p.width()))
        .collect();
    writeln!(f, "    Precinct size: {}", precincts.join(", "))?;
    write!(
        f,
        "    Code block style: {:?}",
        parameters.coding_block_styles()
    )
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} marker segment @ ({}, {})",
            self.name(),
            self.offset(),
            self.length()
        )?;
        match self {
            Segment::Siz(siz) => {
                writeln!(f)?;
                writeln!(f, "    Profile: {}", siz.decoder_capabilities())?;
                writeln!(
                    f,
                    "    Reference grid height, width: ({} x {})",
                    siz.reference_grid_height(),
                    siz.reference_grid_width()
                )?;
                writeln!(
                    f,
                    "    Vertical, horizontal reference grid offset: ({}, {})",
                    siz.image_vertical_offset(),
                    siz.image_horizontal_offset()
                )?;
                writeln!(
                    f,
                    "    Reference tile height, width: ({} x {})",
                    siz.reference_tile_height(),
                    siz.reference_tile_width()
                )?;
                writeln!(
                    f,
                    "    Vertical, horizontal reference tile offset: ({}, {})",
                    siz.tile_vertical_offset(),
                    siz.tile_horizontal_offset()
                )?;
                for (i, component) in siz.components().iter().enumerate() {
                    writeln!(
                        f,
                        "    Component {}: {} bit {}, subsampling ({}, {})",
                        i,
                        component.precision(),
                        if component.values_are_signed() {
                            "signed"
                        } else {
                            "unsigned"
                        },
                        component.vertical_separation(),
                        component.horizontal_separation()
                    )?;
                }
                write!(f, "    Components: {}", siz.no_components())
            }
            Segment::Cod(cod) => {
                writeln!(f)?;
                writeln!(f, "    Coding style: {:?}", cod.coding_styles())?;
                writeln!(f, "    Progression order: {}", cod.progression_order())?;
                writeln!(f, "    Quality layers: {}", cod.no_layers())?;
                writeln!(
                    f,
                    "    Multiple component transformation: {:?}",
                    cod.multiple_component_transformation()
                )?;
                write_coding_style_parameters(f, cod.coding_style_parameters())
            }
            Segment::Coc(coc) => {
                writeln!(f)?;
                writeln!(f, "    Component: {}", coc.component_index())?;
                writeln!(f, "    Coding style: {:?}", coc.coding_styles())?;
                write_coding_style_parameters(f, coc.coding_style_parameters())
            }
            Segment::Qcd(qcd) => {
                writeln!(f)?;
                writeln!(f, "    Quantization style: {:?}", qcd.quantization_style())?;
                write!(f, "    Exponents: {:?}", qcd.quantization_exponents())
            }
            Segment::Qcc(qcc) => {
                writeln!(f)?;
                writeln!(f, "    Component: {}", qcc.component_index())?;
                write!(f, "    Quantization style: {:?}", qcc.quantization_style())
            }
            Segment::Com(com) => match com.comment_utf8() {
                Ok(comment) => write!(f, "\n    \"{}\"", comment),
                Err(_) => write!(f, "\n    {} bytes of binary data", com.comment().len()),
            },
            Segment::Sot(sot) => write!(
                f,
                "\n    Tile index: {}\n    Tile-part length: {}\n    Tile-part index: {}\n    Number of tile-parts: {}",
                sot.tile_index(),
                sot.tile_length(),
                sot.tile_part_index(),
                sot.no_tile_parts()
            ),
            Segment::Unknown(segment) => write!(f, " marker {}", marker_hex(&segment.marker)),
            _ => Ok(()),
        }
    }
}

type Payload = io::Cursor<Vec<u8>>;

fn remaining(payload: &Payload) -> usize {
    payload.get_ref().len().saturating_sub(payload.position() as usize)
}

fn read_u8(payload: &mut Payload) -> io::Result<u8> {
    let mut buffer = [0; 1];
    payload.read_exact(&mut buffer)?;
    Ok(buffer[0])
}

fn read_u16(payload: &mut Payload) -> io::Result<u16> {
    let mut buffer = [0; 2];
    payload.read_exact(&mut buffer)?;
    Ok(u16::from_be_bytes(buffer))
}

fn read_u32(payload: &mut Payload) -> io::Result<u32> {
    let mut buffer = [0; 4];
    payload.read_exact(&mut buffer)?;
    Ok(u32::from_be_bytes(buffer))
}

// Component indices are 8 bits when Csiz < 257, 16 bits otherwise.
fn decode_component_index(payload: &mut Payload, no_components: u16) -> io::Result<u16> {
    if no_components < 257 {
        Ok(read_u8(payload)? as u16)
    } else {
        read_u16(payload)
    }
}

// Packet lengths are split in 7 bit groups, most significant first, with the
// high bit set on every byte but the last (A.7.2).
fn decode_packet_lengths(bytes: &[u8]) -> Vec<u32> {
    let mut lengths = vec![];
    let mut value: u32 = 0;
    for byte in bytes {
        value = (value << 7) | (byte & 0x7f) as u32;
        if byte & 0x80 == 0 {
            lengths.push(value);
            value = 0;
        }
    }
    if value != 0 {
        debug!("packet length continues in the next marker segment");
    }
    lengths
}

fn segment_error(marker: MarkerSymbol, offset: u64, error: String) -> CodestreamError {
    CodestreamError::MarkerError {
        marker,
        offset,
        error,
    }
}

// Reading past the payload of a segment means the declared length is too
// short for the layout of that marker.
fn truncated(
    marker: MarkerSymbol,
    offset: u64,
    length: u16,
) -> impl Fn(CodestreamError) -> CodestreamError {
    move |error| match error {
        CodestreamError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => segment_error(
            marker,
            offset,
            format!("length {} is too short for the segment contents", length),
        ),
        error => error,
    }
}

fn decode_siz(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<ImageAndTileSizeMarkerSegment, CodestreamError> {
    let mut segment = ImageAndTileSizeMarkerSegment {
        offset,
        length,
        ..Default::default()
    };

    payload.read_exact(&mut segment.decoder_capabilities)?;
    payload.read_exact(&mut segment.reference_grid_width)?;
    payload.read_exact(&mut segment.reference_grid_height)?;
    payload.read_exact(&mut segment.image_horizontal_offset)?;
    payload.read_exact(&mut segment.image_vertical_offset)?;
    payload.read_exact(&mut segment.reference_tile_width)?;
    payload.read_exact(&mut segment.reference_tile_height)?;
    payload.read_exact(&mut segment.tile_horizontal_offset)?;
    payload.read_exact(&mut segment.tile_vertical_offset)?;
    payload.read_exact(&mut segment.no_components)?;

    let no_components = segment.no_components();
    if no_components == 0 || no_components > 16384 {
        return Err(segment_error(
            MARKER_SYMBOL_SIZ,
            offset,
            format!("number of components {} outside 1 to 16384", no_components),
        ));
    }

    // Lsiz = 38 + 3 * Csiz
    if length as usize != 38 + 3 * no_components as usize {
        return Err(segment_error(
            MARKER_SYMBOL_SIZ,
            offset,
            format!(
                "length {} does not match {} components",
                length, no_components
            ),
        ));
    }

    segment.components = Vec::with_capacity(no_components as usize);
    for i in 0..no_components {
        let mut component = ComponentSize::default();
        payload.read_exact(&mut component.precision)?;
        payload.read_exact(&mut component.horizontal_separation)?;
        payload.read_exact(&mut component.vertical_separation)?;

        if component.horizontal_separation() == 0 || component.vertical_separation() == 0 {
            return Err(segment_error(
                MARKER_SYMBOL_SIZ,
                offset,
                format!("component {} has a zero sample separation", i),
            ));
        }
        segment.components.push(component);
    }

    if segment.reference_grid_width() <= segment.image_horizontal_offset()
        || segment.reference_grid_height() <= segment.image_vertical_offset()
    {
        return Err(segment_error(
            MARKER_SYMBOL_SIZ,
            offset,
            "image area is empty".to_owned(),
        ));
    }

    if segment.reference_tile_width() == 0 || segment.reference_tile_height() == 0 {
        return Err(segment_error(
            MARKER_SYMBOL_SIZ,
            offset,
            "tile size is zero".to_owned(),
        ));
    }

    // 0 ≤ XTOsiz ≤ XOsiz
    // 0 ≤ YTOsiz ≤ YOsiz
    if segment.tile_horizontal_offset() > segment.image_horizontal_offset()
        || segment.tile_vertical_offset() > segment.image_vertical_offset()
    {
        return Err(CodestreamError::TileGridOffsetOverflow {
            tile_horizontal_offset: segment.tile_horizontal_offset(),
            image_horizontal_offset: segment.image_horizontal_offset(),
            tile_vertical_offset: segment.tile_vertical_offset(),
            image_vertical_offset: segment.image_vertical_offset(),
        });
    }

    // Tile 0 must hold at least one reference grid point of the image area.
    if (segment.reference_tile_width() as u64 + segment.tile_horizontal_offset() as u64)
        <= segment.image_horizontal_offset() as u64
        || (segment.reference_tile_height() as u64 + segment.tile_vertical_offset() as u64)
            <= segment.image_vertical_offset() as u64
    {
        return Err(CodestreamError::TileSizeOverflow {
            reference_tile_width: segment.reference_tile_width(),
            tile_horizontal_offset: segment.tile_horizontal_offset(),
            image_horizontal_offset: segment.image_horizontal_offset(),
            reference_tile_height: segment.reference_tile_height(),
            tile_vertical_offset: segment.tile_vertical_offset(),
            image_vertical_offset: segment.image_vertical_offset(),
        });
    }

    debug!(
        "SIZ grid {}x{}, tiles {}x{}, {} components",
        segment.reference_grid_width(),
        segment.reference_grid_height(),
        segment.reference_tile_width(),
        segment.reference_tile_height(),
        no_components
    );

    Ok(segment)
}

fn decode_coding_style_parameters(
    payload: &mut Payload,
    coding_style: u8,
) -> Result<CodingStyleParameters, CodestreamError> {
    let mut parameters = CodingStyleParameters {
        coding_style: [coding_style],
        ..Default::default()
    };

    payload.read_exact(&mut parameters.no_decomposition_levels)?;
    payload.read_exact(&mut parameters.code_block_width)?;
    payload.read_exact(&mut parameters.code_block_height)?;
    payload.read_exact(&mut parameters.code_block_style)?;
    payload.read_exact(&mut parameters.transformation)?;

    if parameters.has_defined_precinct_size() {
        parameters.precinct_size = vec![0; parameters.no_decomposition_levels() as usize + 1];
        payload.read_exact(&mut parameters.precinct_size)?;
    }

    // xcb + ycb <= 12
    if (parameters.code_block_width[0] & 0x0f) + (parameters.code_block_height[0] & 0x0f) > 8 {
        warn!(
            "code-block size {}x{} exceeds 4096 samples",
            parameters.code_block_width(),
            parameters.code_block_height()
        );
    }

    Ok(parameters)
}

fn decode_cod(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<CodingStyleMarkerSegment, CodestreamError> {
    let mut segment = CodingStyleMarkerSegment {
        offset,
        length,
        ..Default::default()
    };

    payload.read_exact(&mut segment.coding_style)?;
    payload.read_exact(&mut segment.progression_order)?;
    payload.read_exact(&mut segment.no_layers)?;
    payload.read_exact(&mut segment.multiple_component_transformation)?;

    segment.coding_style_parameters =
        decode_coding_style_parameters(payload, segment.coding_style[0])?;

    debug!(
        "COD progression {}, {} layers, {} decomposition levels",
        segment.progression_order(),
        segment.no_layers(),
        segment.coding_style_parameters.no_decomposition_levels()
    );

    Ok(segment)
}

fn decode_coc(
    offset: u64,
    length: u16,
    payload: &mut Payload,
    no_components: u16,
) -> Result<CodingStyleComponentSegment, CodestreamError> {
    let mut segment = CodingStyleComponentSegment {
        offset,
        length,
        ..Default::default()
    };

    segment.index = decode_component_index(payload, no_components)?;
    payload.read_exact(&mut segment.coding_style)?;
    segment.coding_style_parameters =
        decode_coding_style_parameters(payload, segment.coding_style[0])?;

    Ok(segment)
}

fn decode_quantization_values(
    payload: &mut Payload,
    marker: MarkerSymbol,
    offset: u64,
    style: QuantizationStyle,
) -> Result<Vec<QuantizationValue>, CodestreamError> {
    let mut values = vec![];
    match style {
        // Reversible, one byte per subband
        QuantizationStyle::No { .. } => {
            while remaining(payload) > 0 {
                values.push(QuantizationValue::Reversible {
                    value: read_u8(payload)?,
                });
            }
        }
        QuantizationStyle::ScalarDerived { .. } | QuantizationStyle::ScalarExpounded { .. } => {
            if remaining(payload) % 2 != 0 {
                return Err(segment_error(
                    marker,
                    offset,
                    "odd number of bytes for 16 bit step sizes".to_owned(),
                ));
            }
            while remaining(payload) > 0 {
                values.push(QuantizationValue::Irreversible {
                    value: read_u16(payload)?,
                });
            }
        }
        QuantizationStyle::Reserved { value } => {
            return Err(segment_error(
                marker,
                offset,
                format!("reserved quantization style {:#04x}", value),
            ));
        }
    }

    if let QuantizationStyle::ScalarDerived { .. } = style {
        if values.len() != 1 {
            warn!(
                "scalar derived quantization with {} step sizes, expected 1",
                values.len()
            );
        }
    }

    Ok(values)
}

fn decode_qcd(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<QuantizationDefaultMarkerSegment, CodestreamError> {
    let mut segment = QuantizationDefaultMarkerSegment {
        offset,
        length,
        ..Default::default()
    };

    payload.read_exact(&mut segment.quantization_style)?;
    segment.values = decode_quantization_values(
        payload,
        MARKER_SYMBOL_QCD,
        offset,
        segment.quantization_style(),
    )?;

    Ok(segment)
}

fn decode_qcc(
    offset: u64,
    length: u16,
    payload: &mut Payload,
    no_components: u16,
) -> Result<QuantizationComponentSegment, CodestreamError> {
    let mut segment = QuantizationComponentSegment {
        offset,
        length,
        ..Default::default()
    };

    segment.component_index = decode_component_index(payload, no_components)?;
    payload.read_exact(&mut segment.quantization_style)?;
    segment.values = decode_quantization_values(
        payload,
        MARKER_SYMBOL_QCC,
        offset,
        segment.quantization_style(),
    )?;

    Ok(segment)
}

fn decode_rgn(
    offset: u64,
    length: u16,
    payload: &mut Payload,
    no_components: u16,
) -> Result<RegionOfInterestSegment, CodestreamError> {
    let mut segment = RegionOfInterestSegment {
        offset,
        length,
        ..Default::default()
    };

    segment.component_index = decode_component_index(payload, no_components)?;
    payload.read_exact(&mut segment.region_of_interest_style)?;
    payload.read_exact(&mut segment.region_of_interest_style_parameter)?;

    Ok(segment)
}

fn decode_poc(
    offset: u64,
    length: u16,
    payload: &mut Payload,
    no_components: u16,
) -> Result<ProgressionOrderChangeSegment, CodestreamError> {
    let mut segment = ProgressionOrderChangeSegment {
        offset,
        length,
        ..Default::default()
    };

    // The number of progression changes follows from the segment length.
    let entry_size = if no_components < 257 { 7 } else { 9 };
    if remaining(payload) == 0 || remaining(payload) % entry_size != 0 {
        return Err(segment_error(
            MARKER_SYMBOL_POC,
            offset,
            format!(
                "length {} is not a whole number of {} byte progressions",
                length, entry_size
            ),
        ));
    }

    while remaining(payload) > 0 {
        segment.progressions.push(ProgressionOrderChange {
            resolution_level_index_start: read_u8(payload)?,
            component_index_start: decode_component_index(payload, no_components)?,
            layer_index_end: read_u16(payload)?,
            resolution_level_index_end: read_u8(payload)?,
            component_index_end: decode_component_index(payload, no_components)?,
            progression_order: read_u8(payload)?,
        });
    }

    Ok(segment)
}

fn decode_tlm(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<TilePartLengthsSegment, CodestreamError> {
    let mut segment = TilePartLengthsSegment {
        offset,
        length,
        ..Default::default()
    };

    segment.index = read_u8(payload)?;
    segment.parameter_sizes = read_u8(payload)?;

    // Stlm: ST in bits 4-5 gives the Ttlm size, SP in bit 6 the Ptlm size.
    let tile_index_size = match (segment.parameter_sizes >> 4) & 0b11 {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => {
            return Err(segment_error(
                MARKER_SYMBOL_TLM,
                offset,
                format!("reserved Stlm value {:#04x}", segment.parameter_sizes),
            ))
        }
    };
    let tile_length_size = if segment.parameter_sizes & 0b0100_0000 != 0 {
        4
    } else {
        2
    };

    let entry_size = tile_index_size + tile_length_size;
    if remaining(payload) % entry_size != 0 {
        return Err(segment_error(
            MARKER_SYMBOL_TLM,
            offset,
            format!(
                "length {} is not a whole number of {} byte entries",
                length, entry_size
            ),
        ));
    }

    while remaining(payload) > 0 {
        let tile_index = match tile_index_size {
            1 => Some(read_u8(payload)? as u16),
            2 => Some(read_u16(payload)?),
            _ => None,
        };
        let tile_part_length = match tile_length_size {
            4 => read_u32(payload)?,
            _ => read_u16(payload)? as u32,
        };
        segment.tile_part_lengths.push(TilePartLength {
            tile_index,
            tile_part_length,
        });
    }

    Ok(segment)
}

fn decode_plm(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<PacketLengthSegment, CodestreamError> {
    let mut segment = PacketLengthSegment {
        offset,
        length,
        ..Default::default()
    };

    segment.index = read_u8(payload)?;

    // (Nplm, Iplm...) pairs, one per tile-part
    while remaining(payload) > 0 {
        let no_bytes = read_u8(payload)? as usize;
        let mut bytes = vec![0; no_bytes];
        payload.read_exact(&mut bytes)?;
        segment.tile_parts.push(decode_packet_lengths(&bytes));
    }

    Ok(segment)
}

fn decode_plt(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<TilePacketLengthSegment, CodestreamError> {
    let index = read_u8(payload)?;
    let mut bytes = vec![];
    payload.read_to_end(&mut bytes)?;

    Ok(TilePacketLengthSegment {
        offset,
        length,
        index,
        packet_lengths: decode_packet_lengths(&bytes),
    })
}

fn decode_ppm(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<PackedPacketHeaderSegment, CodestreamError> {
    let index = read_u8(payload)?;
    let mut data = vec![];
    payload.read_to_end(&mut data)?;

    Ok(PackedPacketHeaderSegment {
        offset,
        length,
        index,
        data,
    })
}

fn decode_ppt(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<TilePackedPacketHeaderSegment, CodestreamError> {
    let index = read_u8(payload)?;
    let mut data = vec![];
    payload.read_to_end(&mut data)?;

    Ok(TilePackedPacketHeaderSegment {
        offset,
        length,
        index,
        data,
    })
}

fn decode_crg(
    offset: u64,
    length: u16,
    payload: &mut Payload,
    no_components: u16,
) -> Result<ComponentRegistrationSegment, CodestreamError> {
    if remaining(payload) != 4 * no_components as usize {
        return Err(segment_error(
            MARKER_SYMBOL_CRG,
            offset,
            format!(
                "length {} does not match {} components",
                length, no_components
            ),
        ));
    }

    let mut registrations = Vec::with_capacity(no_components as usize);
    for _ in 0..no_components {
        registrations.push((read_u16(payload)?, read_u16(payload)?));
    }

    Ok(ComponentRegistrationSegment {
        offset,
        length,
        registrations,
    })
}

fn decode_com(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<CommentMarkerSegment, CodestreamError> {
    let mut segment = CommentMarkerSegment {
        offset,
        length,
        ..Default::default()
    };

    payload.read_exact(&mut segment.registration_value)?;
    payload.read_to_end(&mut segment.comment)?;

    Ok(segment)
}

fn decode_sot(
    offset: u64,
    length: u16,
    payload: &mut Payload,
) -> Result<StartOfTileSegment, CodestreamError> {
    // Lsot is fixed
    if length != 10 {
        return Err(segment_error(
            MARKER_SYMBOL_SOT,
            offset,
            format!("length {} differs from 10", length),
        ));
    }

    let mut segment = StartOfTileSegment {
        offset,
        length,
        ..Default::default()
    };

    payload.read_exact(&mut segment.tile_index)?;
    payload.read_exact(&mut segment.tile_length)?;
    payload.read_exact(&mut segment.tile_part_index)?;
    payload.read_exact(&mut segment.no_tile_parts)?;

    Ok(segment)
}

// Contiguous codestream
//
// The ordered marker segments of one codestream, from SOC up to the first
// tile-part (header only) or up to EOC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Codestream {
    offset: u64,
    length: u64,
    header_only: bool,
    segments: Vec<Segment>,
}

impl Codestream {
    /// Byte offset of the SOC marker.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the byte range the codestream was parsed from.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn header_only(&self) -> bool {
        self.header_only
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Segments before the first SOT.
    pub fn main_header(&self) -> &[Segment] {
        let end = self
            .segments
            .iter()
            .position(|segment| matches!(segment, Segment::Sot(_) | Segment::Eoc { .. }))
            .unwrap_or(self.segments.len());
        &self.segments[..end]
    }

    pub fn siz(&self) -> Option<&ImageAndTileSizeMarkerSegment> {
        self.main_header().iter().find_map(|segment| match segment {
            Segment::Siz(siz) => Some(siz),
            _ => None,
        })
    }

    pub fn cod(&self) -> Option<&CodingStyleMarkerSegment> {
        self.main_header().iter().find_map(|segment| match segment {
            Segment::Cod(cod) => Some(cod),
            _ => None,
        })
    }

    pub fn qcd(&self) -> Option<&QuantizationDefaultMarkerSegment> {
        self.main_header().iter().find_map(|segment| match segment {
            Segment::Qcd(qcd) => Some(qcd),
            _ => None,
        })
    }

    /// COC segments of the main header.
    pub fn coc_segments(&self) -> Vec<&CodingStyleComponentSegment> {
        self.main_header()
            .iter()
            .filter_map(|segment| match segment {
                Segment::Coc(coc) => Some(coc),
                _ => None,
            })
            .collect()
    }

    pub fn comments(&self) -> Vec<&CommentMarkerSegment> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Com(com) => Some(com),
                _ => None,
            })
            .collect()
    }

    pub fn tile_parts(&self) -> Vec<&StartOfTileSegment> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Sot(sot) => Some(sot),
                _ => None,
            })
            .collect()
    }

    fn end(&self) -> u64 {
        self.offset + self.length
    }

    fn read_marker<R: io::Read + io::Seek>(
        &self,
        reader: &mut R,
    ) -> Result<Option<(MarkerSymbol, u64)>, CodestreamError> {
        let position = reader.stream_position()?;
        if position + 2 > self.end() {
            return Ok(None);
        }

        let mut marker: MarkerSymbol = [0; 2];
        reader.read_exact(&mut marker)?;
        Ok(Some((marker, position)))
    }

    // Reads Lxxx and the parameters that follow, refusing anything that
    // reaches past the codestream range.
    fn read_payload<R: io::Read + io::Seek>(
        &self,
        reader: &mut R,
        marker: MarkerSymbol,
        offset: u64,
    ) -> Result<(u16, Payload), CodestreamError> {
        let position = offset + 2;
        if position + 2 > self.end() {
            return Err(segment_error(
                marker,
                offset,
                "segment length runs past the end of the codestream".to_owned(),
            ));
        }

        let mut length: [u8; 2] = [0; 2];
        reader.read_exact(&mut length)?;
        let length = u16::from_be_bytes(length);

        if length < 2 {
            return Err(segment_error(
                marker,
                offset,
                format!("length {} is shorter than the length field", length),
            ));
        }
        if position + length as u64 > self.end() {
            return Err(segment_error(
                marker,
                offset,
                format!(
                    "length {} runs past the end of the codestream at byte offset {}",
                    length,
                    self.end()
                ),
            ));
        }

        let mut payload = vec![0; length as usize - 2];
        reader.read_exact(&mut payload)?;

        Ok((length, io::Cursor::new(payload)))
    }

    fn decode_segment<R: io::Read + io::Seek>(
        &self,
        reader: &mut R,
        marker: MarkerSymbol,
        offset: u64,
        no_components: u16,
    ) -> Result<Segment, CodestreamError> {
        if is_reserved_without_length(marker) {
            debug!(
                "skipping reserved marker {} at byte offset {}",
                marker_hex(&marker),
                offset
            );
            return Ok(Segment::Unknown(UnknownSegment {
                marker,
                offset,
                length: 0,
            }));
        }

        let (length, mut payload) = self.read_payload(reader, marker, offset)?;
        info!("{} start at byte offset {}", marker_name(marker), offset);

        let payload = &mut payload;
        let segment = match marker {
            MARKER_SYMBOL_SIZ => decode_siz(offset, length, payload).map(Segment::Siz),
            MARKER_SYMBOL_COD => decode_cod(offset, length, payload).map(Segment::Cod),
            MARKER_SYMBOL_COC => {
                decode_coc(offset, length, payload, no_components).map(Segment::Coc)
            }
            MARKER_SYMBOL_QCD => decode_qcd(offset, length, payload).map(Segment::Qcd),
            MARKER_SYMBOL_QCC => {
                decode_qcc(offset, length, payload, no_components).map(Segment::Qcc)
            }
            MARKER_SYMBOL_RGN => {
                decode_rgn(offset, length, payload, no_components).map(Segment::Rgn)
            }
            MARKER_SYMBOL_POC => {
                decode_poc(offset, length, payload, no_components).map(Segment::Poc)
            }
            MARKER_SYMBOL_TLM => decode_tlm(offset, length, payload).map(Segment::Tlm),
            MARKER_SYMBOL_PLM => decode_plm(offset, length, payload).map(Segment::Plm),
            MARKER_SYMBOL_PLT => decode_plt(offset, length, payload).map(Segment::Plt),
            MARKER_SYMBOL_PPM => decode_ppm(offset, length, payload).map(Segment::Ppm),
            MARKER_SYMBOL_PPT => decode_ppt(offset, length, payload).map(Segment::Ppt),
            MARKER_SYMBOL_CRG => {
                decode_crg(offset, length, payload, no_components).map(Segment::Crg)
            }
            MARKER_SYMBOL_COM => decode_com(offset, length, payload).map(Segment::Com),
            MARKER_SYMBOL_SOT => decode_sot(offset, length, payload).map(Segment::Sot),
            _ => {
                debug!(
                    "skipping unknown marker {} of length {}",
                    marker_hex(&marker),
                    length
                );
                Ok(Segment::Unknown(UnknownSegment {
                    marker,
                    offset,
                    length,
                }))
            }
        }
        .map_err(truncated(marker, offset, length))?;

        if remaining(payload) > 0 {
            debug!(
                "{} leaves {} trailing bytes unread",
                marker_name(marker),
                remaining(payload)
            );
        }
        info!(
            "{} end at byte offset {}",
            marker_name(marker),
            reader.stream_position()?
        );

        Ok(segment)
    }

    // A.3 - Construction of the main header
    fn decode_main_header<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut R,
    ) -> Result<u16, CodestreamError> {
        // SOC (Required as the first marker)
        match self.read_marker(reader)? {
            Some((MARKER_SYMBOL_SOC, offset)) => {
                info!("SOC start at byte offset {}", offset);
                self.segments.push(Segment::Soc { offset });
            }
            Some((marker, offset)) => {
                return Err(CodestreamError::MarkerUnexpected { marker, offset });
            }
            None => {
                return Err(CodestreamError::MarkerMissing {
                    marker: MARKER_SYMBOL_SOC,
                })
            }
        }

        // SIZ (Required as the second marker segment)
        let no_components = match self.read_marker(reader)? {
            Some((MARKER_SYMBOL_SIZ, offset)) => {
                let segment = self.decode_segment(reader, MARKER_SYMBOL_SIZ, offset, 0)?;
                let no_components = match &segment {
                    Segment::Siz(siz) => siz.no_components(),
                    _ => 0,
                };
                self.segments.push(segment);
                no_components
            }
            Some((marker, offset)) => {
                return Err(CodestreamError::MarkerUnexpected { marker, offset });
            }
            None => {
                return Err(CodestreamError::MarkerMissing {
                    marker: MARKER_SYMBOL_SIZ,
                })
            }
        };

        loop {
            let Some((marker, offset)) = self.read_marker(reader)? else {
                warn!(
                    "codestream ends at byte offset {} inside the main header",
                    self.end()
                );
                break;
            };

            match marker {
                // Start of the first tile-part, left for the tile-part walk
                MARKER_SYMBOL_SOT => {
                    reader.seek(io::SeekFrom::Start(offset))?;
                    break;
                }
                MARKER_SYMBOL_EOC => {
                    warn!("EOC at byte offset {} before any tile-part", offset);
                    self.segments.push(Segment::Eoc { offset });
                    break;
                }
                // Only valid in tile-part headers or the bit stream
                MARKER_SYMBOL_SOC | MARKER_SYMBOL_SIZ | MARKER_SYMBOL_SOD | MARKER_SYMBOL_PLT
                | MARKER_SYMBOL_PPT | MARKER_SYMBOL_SOP | MARKER_SYMBOL_EPH => {
                    return Err(CodestreamError::MarkerUnexpected { marker, offset });
                }
                _ if marker[0] != 0xFF => {
                    return Err(CodestreamError::MarkerUnexpected { marker, offset });
                }
                _ => {
                    let segment = self.decode_segment(reader, marker, offset, no_components)?;
                    self.segments.push(segment);
                }
            }
        }

        self.validate_main_header(no_components)?;

        Ok(no_components)
    }

    fn validate_main_header(&self, no_components: u16) -> Result<(), CodestreamError> {
        let header = self.main_header();

        // Required
        if !header.iter().any(|s| matches!(s, Segment::Cod(_))) {
            return Err(CodestreamError::MarkerMissing {
                marker: MARKER_SYMBOL_COD,
            });
        }
        if !header.iter().any(|s| matches!(s, Segment::Qcd(_))) {
            return Err(CodestreamError::MarkerMissing {
                marker: MARKER_SYMBOL_QCD,
            });
        }

        // A.6.2, A.6.3, A.6.5: no more than one COC, RGN or QCC per component
        for (marker, description) in [
            (MARKER_SYMBOL_COC, "coding style component (COC)"),
            (MARKER_SYMBOL_RGN, "region of interest (RGN)"),
            (MARKER_SYMBOL_QCC, "quantization component (QCC)"),
        ] {
            let segments: Vec<&Segment> = header.iter().filter(|s| s.marker() == marker).collect();
            if segments.len() > no_components as usize {
                let offset = segments.last().map(|s| s.offset()).unwrap_or(self.offset);
                return Err(CodestreamError::MarkerError {
                    marker,
                    offset,
                    error: format!(
                        "number of {} {} exceeds number of components {}",
                        description,
                        segments.len(),
                        no_components
                    ),
                });
            }
        }

        Ok(())
    }

    // A.4 - Construction of a tile-part header, followed by its data
    fn decode_tile_part<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut R,
        offset: u64,
        no_components: u16,
    ) -> Result<(), CodestreamError> {
        let segment = self.decode_segment(reader, MARKER_SYMBOL_SOT, offset, no_components)?;
        let tile_length = match &segment {
            Segment::Sot(sot) => sot.tile_length(),
            _ => 0,
        };
        self.segments.push(segment);

        loop {
            let Some((marker, marker_offset)) = self.read_marker(reader)? else {
                return Err(CodestreamError::MarkerMissing {
                    marker: MARKER_SYMBOL_SOD,
                });
            };

            match marker {
                // Required as the last marker of every tile-part header
                MARKER_SYMBOL_SOD => {
                    info!("SOD start at byte offset {}", marker_offset);
                    self.segments.push(Segment::Sod {
                        offset: marker_offset,
                    });
                    break;
                }
                MARKER_SYMBOL_COD | MARKER_SYMBOL_COC | MARKER_SYMBOL_QCD | MARKER_SYMBOL_QCC
                | MARKER_SYMBOL_RGN | MARKER_SYMBOL_POC | MARKER_SYMBOL_PPT | MARKER_SYMBOL_PLT
                | MARKER_SYMBOL_COM => {
                    let segment =
                        self.decode_segment(reader, marker, marker_offset, no_components)?;
                    self.segments.push(segment);
                }
                _ if marker[0] == 0xFF && !is_known(marker) => {
                    let segment =
                        self.decode_segment(reader, marker, marker_offset, no_components)?;
                    self.segments.push(segment);
                }
                _ => {
                    return Err(CodestreamError::MarkerUnexpected {
                        marker,
                        offset: marker_offset,
                    });
                }
            }
        }

        // Psot of 0 means the tile-part runs up to the final EOC.
        let start_of_data = reader.stream_position()?;
        let end_of_data = if tile_length == 0 {
            self.end().saturating_sub(2)
        } else {
            offset + tile_length as u64
        };

        if end_of_data > self.end() || end_of_data < start_of_data {
            return Err(CodestreamError::MarkerError {
                marker: MARKER_SYMBOL_SOT,
                offset,
                error: format!(
                    "tile-part length {} does not fit the codestream ending at byte offset {}",
                    tile_length,
                    self.end()
                ),
            });
        }

        info!(
            "tile-part data from byte offset {} to {}",
            start_of_data, end_of_data
        );
        reader.seek(io::SeekFrom::Start(end_of_data))?;

        Ok(())
    }

    fn decode_tile_parts<R: io::Read + io::Seek>(
        &mut self,
        reader: &mut R,
        no_components: u16,
    ) -> Result<(), CodestreamError> {
        loop {
            let Some((marker, offset)) = self.read_marker(reader)? else {
                warn!(
                    "codestream ends at byte offset {} without an EOC marker",
                    self.end()
                );
                return Ok(());
            };

            match marker {
                MARKER_SYMBOL_SOT => self.decode_tile_part(reader, offset, no_components)?,
                MARKER_SYMBOL_EOC => {
                    info!("EOC start at byte offset {}", offset);
                    self.segments.push(Segment::Eoc { offset });
                    return Ok(());
                }
                _ => return Err(CodestreamError::MarkerUnexpected { marker, offset }),
            }
        }
    }

    fn decode<R: io::Read + io::Seek>(&mut self, reader: &mut R) -> Result<(), CodestreamError> {
        let no_components = self.decode_main_header(reader)?;

        if self.header_only || matches!(self.segments.last(), Some(Segment::Eoc { .. })) {
            return Ok(());
        }

        self.decode_tile_parts(reader, no_components)
    }
}

impl fmt::Display for Codestream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Codestream:")?;
        for segment in &self.segments {
            write!(f, "\n{}", segment)?;
        }
        Ok(())
    }
}

/// Parses the codestream starting at the current position of `reader` and
/// running to the end of the stream.
pub fn decode_jpc<R: io::Read + io::Seek>(
    reader: &mut R,
    header_only: bool,
) -> Result<Codestream, CodestreamError> {
    let start = reader.stream_position()?;
    let end = reader.seek(io::SeekFrom::End(0))?;
    reader.seek(io::SeekFrom::Start(start))?;

    decode_jpc_range(reader, end.saturating_sub(start), header_only)
}

/// Parses a codestream confined to `length` bytes from the current position,
/// such as the payload of a contiguous codestream box.
///
/// In header-only mode parsing stops in front of the first SOT, which is not
/// recorded. Otherwise every tile-part header is parsed and its data skipped
/// using Psot, up to EOC.
pub fn decode_jpc_range<R: io::Read + io::Seek>(
    reader: &mut R,
    length: u64,
    header_only: bool,
) -> Result<Codestream, CodestreamError> {
    let mut codestream = Codestream {
        offset: reader.stream_position()?,
        length,
        header_only,
        segments: vec![],
    };
    codestream.decode(reader)?;

    Ok(codestream)
}
