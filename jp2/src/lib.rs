use log::{debug, info, warn};
use std::fmt;
use std::io;
use std::io::prelude::*;
use thiserror::Error;

pub type BoxType = [u8; 4];

fn box_type_str(box_type: &BoxType) -> String {
    String::from_utf8_lossy(box_type).into_owned()
}

#[derive(Debug, Error)]
pub enum JP2Error {
    #[error("not a JPEG 2000 file: {reason}")]
    NotJP2Format { reason: String },
    #[error("box header truncated at byte offset {offset}")]
    BoxTruncated { offset: u64 },
    #[error("malformed box {:?} at byte offset {offset}: {reason}", box_type_str(.box_type))]
    BoxMalformed {
        box_type: BoxType,
        offset: u64,
        reason: String,
    },
    #[error("expected exactly one contiguous codestream box, found {count}")]
    CodestreamBoxCount { count: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
}

// jP\040\040 (0x6A50 2020)
pub const BOX_TYPE_SIGNATURE: BoxType = [106, 80, 32, 32];
pub const BOX_TYPE_FILE_TYPE: BoxType = [102, 116, 121, 112];
pub const BOX_TYPE_HEADER: BoxType = [106, 112, 50, 104];
pub const BOX_TYPE_IMAGE_HEADER: BoxType = [105, 104, 100, 114];
pub const BOX_TYPE_BITS_PER_COMPONENT: BoxType = [98, 112, 99, 99];
pub const BOX_TYPE_COLOUR_SPECIFICATION: BoxType = [99, 111, 108, 114];
pub const BOX_TYPE_PALETTE: BoxType = [112, 99, 108, 114];
pub const BOX_TYPE_COMPONENT_MAPPING: BoxType = [99, 109, 97, 112];
pub const BOX_TYPE_CHANNEL_DEFINITION: BoxType = [99, 100, 101, 102];
pub const BOX_TYPE_RESOLUTION: BoxType = [114, 101, 115, 32];
pub const BOX_TYPE_CAPTURE_RESOLUTION: BoxType = [114, 101, 115, 99];
pub const BOX_TYPE_DEFAULT_DISPLAY_RESOLUTION: BoxType = [114, 101, 115, 100];
pub const BOX_TYPE_CONTIGUOUS_CODESTREAM: BoxType = [106, 112, 50, 99];
pub const BOX_TYPE_INTELLECTUAL_PROPERTY: BoxType = [106, 112, 50, 105];
pub const BOX_TYPE_XML: BoxType = [120, 109, 108, 32];
pub const BOX_TYPE_UUID: BoxType = [117, 117, 105, 100];
pub const BOX_TYPE_UUID_INFO: BoxType = [117, 105, 110, 102];
pub const BOX_TYPE_UUID_LIST: BoxType = [117, 108, 115, 116];
pub const BOX_TYPE_DATA_ENTRY_URL: BoxType = [117, 114, 108, 32];

// ISO/IEC 15444-2 superboxes
pub const BOX_TYPE_ASSOCIATION: BoxType = [97, 115, 111, 99];
pub const BOX_TYPE_COMPOSITING_LAYER_HEADER: BoxType = [106, 112, 108, 104];
pub const BOX_TYPE_CODESTREAM_HEADER: BoxType = [106, 112, 99, 104];
pub const BOX_TYPE_COLOUR_GROUP: BoxType = [99, 103, 114, 112];
pub const BOX_TYPE_FRAGMENT_TABLE: BoxType = [102, 116, 98, 108];

const SUPERBOX_TYPES: [BoxType; 8] = [
    BOX_TYPE_HEADER,
    BOX_TYPE_RESOLUTION,
    BOX_TYPE_UUID_INFO,
    BOX_TYPE_ASSOCIATION,
    BOX_TYPE_COLOUR_GROUP,
    BOX_TYPE_FRAGMENT_TABLE,
    BOX_TYPE_CODESTREAM_HEADER,
    BOX_TYPE_COMPOSITING_LAYER_HEADER,
];

// jp2\040
pub const BRAND_JP2: [u8; 4] = [106, 112, 50, 32];

// <CR><LF><0x87><LF> (0x0D0A 870A).
pub const SIGNATURE_MAGIC: [u8; 4] = [13, 10, 135, 10];

// SOC marker, first two bytes of a bare codestream.
pub const CODESTREAM_MAGIC: [u8; 2] = [255, 79];

// Enumerated colourspaces of Table I.10.
pub const ENUMERATED_COLOUR_SPACE_SRGB: u32 = 16;
pub const ENUMERATED_COLOUR_SPACE_GREYSCALE: u32 = 17;
pub const ENUMERATED_COLOUR_SPACE_SYCC: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// Raw codestream starting with SOC, no box structure.
    Codestream,
    /// JP2 family file starting with the signature box.
    Jp2,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileFormat::Codestream => write!(f, "codestream"),
            FileFormat::Jp2 => write!(f, "jp2"),
        }
    }
}

/// Signature box payload, I.5.1.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureBox {
    signature: [u8; 4],
}

impl SignatureBox {
    pub fn signature(&self) -> [u8; 4] {
        self.signature
    }
}

/// File Type box, I.5.2.
///
/// Specifies the Recommendation | International Standard which completely
/// defines all of the contents of this file, as well as a separate list of
/// readers, defined by other Recommendations | International Standards, with
/// which the file is compatible.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTypeBox {
    brand: [u8; 4],
    min_version: [u8; 4],
    compatibility_list: Vec<[u8; 4]>,
}

impl FileTypeBox {
    /// Recommendation | International Standard that completely defines this
    /// file, `"jp2 "` for files conforming to ISO/IEC 15444-1.
    pub fn brand(&self) -> String {
        box_type_str(&self.brand)
    }

    /// Minor version; readers shall continue to process the file when it is
    /// not recognised.
    pub fn min_version(&self) -> u32 {
        u32::from_be_bytes(self.min_version)
    }

    /// Standards the file conforms to. A JP2 file lists `"jp2 "`.
    pub fn compatibility_list(&self) -> Vec<String> {
        self.compatibility_list.iter().map(box_type_str).collect()
    }

    fn is_jp2_compatible(&self) -> bool {
        self.compatibility_list.contains(&BRAND_JP2)
    }
}

/// Image Header box, I.5.3.1.
///
/// Fixed length information about the image, such as height, width, number
/// of components and bit depth. Instances outside the JP2 Header box are
/// ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageHeaderBox {
    height: [u8; 4],
    width: [u8; 4],
    components_num: [u8; 2],
    components_bits: [u8; 1],
    compression_type: [u8; 1],
    colourspace_unknown: [u8; 1],
    intellectual_property: [u8; 1],
}

impl ImageHeaderBox {
    /// Image area height, Ysiz - YOsiz of the codestream.
    pub fn height(&self) -> u32 {
        u32::from_be_bytes(self.height)
    }

    /// Image area width, Xsiz - XOsiz of the codestream.
    pub fn width(&self) -> u32 {
        u32::from_be_bytes(self.width)
    }

    /// Csiz
    pub fn components_num(&self) -> u16 {
        u16::from_be_bytes(self.components_num)
    }

    /// Bit depth shared by all components, `None` when it varies and a
    /// Bits Per Component box gives the depth per component.
    pub fn components_bits(&self) -> Option<u8> {
        match self.components_bits[0] {
            255 => None,
            value => Some((value & 0x7f) + 1),
        }
    }

    pub fn values_are_signed(&self) -> bool {
        self.components_bits[0] != 255 && self.components_bits[0] & 0x80 == 0x80
    }

    /// Shall be 7 (ISO/IEC 15444-1 codestream).
    pub fn compression_type(&self) -> u8 {
        self.compression_type[0]
    }

    /// 0 when the Colour Specification boxes are known to be correct, 1
    /// otherwise.
    pub fn colourspace_unknown(&self) -> u8 {
        self.colourspace_unknown[0]
    }

    /// 1 when the file holds an Intellectual Property box.
    pub fn intellectual_property(&self) -> u8 {
        self.intellectual_property[0]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColourSpecificationMethods {
    EnumeratedColourSpace,
    RestrictedICCProfile,
    Reserved { value: u8 },
}

impl ColourSpecificationMethods {
    fn new(value: u8) -> ColourSpecificationMethods {
        match value {
            1 => ColourSpecificationMethods::EnumeratedColourSpace,
            2 => ColourSpecificationMethods::RestrictedICCProfile,
            _ => ColourSpecificationMethods::Reserved { value },
        }
    }
}

/// Colour Specification box, I.5.3.3.
#[derive(Debug, Clone, PartialEq)]
pub struct ColourSpecificationBox {
    method: [u8; 1],
    precedence: [u8; 1],
    colourspace_approximation: [u8; 1],
    enumerated_colour_space: Option<[u8; 4]>,
    restricted_icc_profile: Vec<u8>,
}

impl ColourSpecificationBox {
    pub fn method(&self) -> ColourSpecificationMethods {
        ColourSpecificationMethods::new(self.method[0])
    }

    // Reserved for ISO use, conforming readers ignore the value.
    pub fn precedence(&self) -> i8 {
        self.precedence[0] as i8
    }

    // Reserved for ISO use, conforming readers ignore the value.
    pub fn colourspace_approximation(&self) -> u8 {
        self.colourspace_approximation[0]
    }

    /// EnumCS, only present for the enumerated method.
    pub fn enumerated_colour_space(&self) -> Option<u32> {
        self.enumerated_colour_space.map(u32::from_be_bytes)
    }

    /// PROFILE, empty unless the method is a restricted ICC profile.
    pub fn restricted_icc_profile(&self) -> &[u8] {
        &self.restricted_icc_profile
    }
}

/// Decoded payload of the descriptive boxes. Other leaf boxes only record
/// their position.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxContents {
    Signature(SignatureBox),
    FileType(FileTypeBox),
    ImageHeader(ImageHeaderBox),
    ColourSpecification(ColourSpecificationBox),
}

/// One box of the file, I.4.
#[derive(Debug, Clone, PartialEq)]
pub struct Jp2Box {
    box_type: BoxType,
    offset: u64,
    length: u64,
    header_length: u8,
    extends_to_end: bool,
    contents: Option<BoxContents>,
    children: Vec<Jp2Box>,
}

impl Jp2Box {
    pub fn box_type(&self) -> BoxType {
        self.box_type
    }

    /// Box type as its four character code, e.g. `"jp2h"`.
    pub fn name(&self) -> String {
        box_type_str(&self.box_type)
    }

    /// Byte offset of the LBox field.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the whole box, header included.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// 8, or 16 when the XLBox field is present.
    pub fn header_length(&self) -> u8 {
        self.header_length
    }

    /// LBox was 0, the box runs to the end of its enclosing range.
    pub fn extends_to_end(&self) -> bool {
        self.extends_to_end
    }

    pub fn payload_offset(&self) -> u64 {
        self.offset + self.header_length as u64
    }

    pub fn payload_length(&self) -> u64 {
        self.length - self.header_length as u64
    }

    pub fn contents(&self) -> Option<&BoxContents> {
        self.contents.as_ref()
    }

    pub fn children(&self) -> &[Jp2Box] {
        &self.children
    }

    pub fn is_superbox(&self) -> bool {
        SUPERBOX_TYPES.contains(&self.box_type)
    }

    fn find(&self, box_type: BoxType) -> Option<&Jp2Box> {
        if self.box_type == box_type {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(box_type))
    }

    fn collect<'a>(&'a self, box_type: BoxType, found: &mut Vec<&'a Jp2Box>) {
        if self.box_type == box_type {
            found.push(self);
        }
        for child in &self.children {
            child.collect(box_type, found);
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter, depth: usize) -> fmt::Result {
        let indent = "    ".repeat(depth);
        write!(
            f,
            "{}{} box @ ({}, {})",
            indent,
            self.name(),
            self.offset,
            self.length
        )?;

        let details = "    ".repeat(depth + 1);
        match &self.contents {
            Some(BoxContents::Signature(signature)) => {
                let hex: Vec<String> = signature
                    .signature
                    .iter()
                    .map(|byte| format!("{:02x}", byte))
                    .collect();
                write!(f, "\n{}Signature: {}", details, hex.concat())?;
            }
            Some(BoxContents::FileType(file_type)) => {
                write!(
                    f,
                    "\n{}Brand: {}\n{}Compatibility: {:?}",
                    details,
                    file_type.brand(),
                    details,
                    file_type.compatibility_list()
                )?;
            }
            Some(BoxContents::ImageHeader(header)) => {
                write!(
                    f,
                    "\n{}Size: [{} {} {}]\n{}Bitdepth: {}\n{}Signed: {}",
                    details,
                    header.height(),
                    header.width(),
                    header.components_num(),
                    details,
                    header
                        .components_bits()
                        .map(|bits| bits.to_string())
                        .unwrap_or_else(|| "varies".to_owned()),
                    details,
                    header.values_are_signed()
                )?;
            }
            Some(BoxContents::ColourSpecification(colour)) => {
                write!(f, "\n{}Method: {:?}", details, colour.method())?;
                if let Some(colour_space) = colour.enumerated_colour_space() {
                    let name = match colour_space {
                        ENUMERATED_COLOUR_SPACE_SRGB => "sRGB",
                        ENUMERATED_COLOUR_SPACE_GREYSCALE => "greyscale",
                        ENUMERATED_COLOUR_SPACE_SYCC => "sYCC",
                        _ => "other",
                    };
                    write!(f, "\n{}Colorspace: {} ({})", details, name, colour_space)?;
                }
            }
            None => {}
        }

        for child in &self.children {
            writeln!(f)?;
            child.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Jp2Box {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JP2File {
    format: FileFormat,
    length: u64,
    boxes: Vec<Jp2Box>,
}

impl JP2File {
    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Length of the parsed stream in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Top level boxes, empty for a bare codestream.
    pub fn boxes(&self) -> &[Jp2Box] {
        &self.boxes
    }

    /// First box of the given type, depth first.
    pub fn find(&self, box_type: BoxType) -> Option<&Jp2Box> {
        self.boxes.iter().find_map(|b| b.find(box_type))
    }

    /// Every box of the given type, depth first.
    pub fn find_all(&self, box_type: BoxType) -> Vec<&Jp2Box> {
        let mut found = vec![];
        for b in &self.boxes {
            b.collect(box_type, &mut found);
        }
        found
    }

    pub fn contiguous_codestreams_boxes(&self) -> Vec<&Jp2Box> {
        self.find_all(BOX_TYPE_CONTIGUOUS_CODESTREAM)
    }

    /// The single Contiguous Codestream box of a JP2 file.
    pub fn codestream_box(&self) -> Result<&Jp2Box, JP2Error> {
        match self.contiguous_codestreams_boxes().as_slice() {
            [codestream_box] => Ok(codestream_box),
            boxes => Err(JP2Error::CodestreamBoxCount { count: boxes.len() }),
        }
    }

    pub fn file_type(&self) -> Option<&FileTypeBox> {
        self.boxes
            .iter()
            .find(|b| b.box_type == BOX_TYPE_FILE_TYPE)
            .and_then(|b| match &b.contents {
                Some(BoxContents::FileType(file_type)) => Some(file_type),
                _ => None,
            })
    }

    fn header_child(&self, box_type: BoxType) -> Option<&BoxContents> {
        self.boxes
            .iter()
            .find(|b| b.box_type == BOX_TYPE_HEADER)
            .and_then(|header| header.children.iter().find(|b| b.box_type == box_type))
            .and_then(|b| b.contents.as_ref())
    }

    /// Image Header box of the JP2 Header box.
    pub fn image_header(&self) -> Option<&ImageHeaderBox> {
        match self.header_child(BOX_TYPE_IMAGE_HEADER) {
            Some(BoxContents::ImageHeader(header)) => Some(header),
            _ => None,
        }
    }

    /// First Colour Specification box of the JP2 Header box.
    pub fn colour_specification(&self) -> Option<&ColourSpecificationBox> {
        match self.header_child(BOX_TYPE_COLOUR_SPECIFICATION) {
            Some(BoxContents::ColourSpecification(colour)) => Some(colour),
            _ => None,
        }
    }

    // Layout rules of I.5 that readers are expected to tolerate.
    fn check_layout(&self) {
        if self.boxes.get(1).map(|b| b.box_type) != Some(BOX_TYPE_FILE_TYPE) {
            warn!("File Type box does not immediately follow the signature box");
        }

        if let Some(file_type) = self.file_type() {
            if file_type.brand != BRAND_JP2 {
                warn!("brand {:?} is not 'jp2 '", file_type.brand());
            }
            if !file_type.is_jp2_compatible() {
                warn!(
                    "'jp2 ' not found in compatibility list {:?}",
                    file_type.compatibility_list()
                );
            }
        }

        let header_position = self
            .boxes
            .iter()
            .position(|b| b.box_type == BOX_TYPE_HEADER);
        let codestream_position = self
            .boxes
            .iter()
            .position(|b| b.box_type == BOX_TYPE_CONTIGUOUS_CODESTREAM);
        match (header_position, codestream_position) {
            (None, _) => warn!("JP2 Header box missing"),
            (Some(header), Some(codestream)) if codestream < header => {
                warn!("Contiguous Codestream box precedes the JP2 Header box")
            }
            _ => {}
        }

        if let Some(header) = header_position.map(|i| &self.boxes[i]) {
            if header.children.first().map(|b| b.box_type) != Some(BOX_TYPE_IMAGE_HEADER) {
                warn!("Image Header box is not the first box of the JP2 Header box");
            }
        }
    }
}

impl fmt::Display for JP2File {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.format {
            FileFormat::Codestream => write!(f, "Codestream of {} bytes", self.length),
            FileFormat::Jp2 => {
                for (i, b) in self.boxes.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", b)?;
                }
                Ok(())
            }
        }
    }
}

struct BoxHeader {
    // TBox
    box_type: BoxType,

    // Resolved length of the box, header included.
    box_length: u64,

    // 8, or 16 with XLBox
    header_length: u8,

    // LBox was 0
    extends_to_end: bool,
}

fn truncated_at(offset: u64) -> impl Fn(io::Error) -> JP2Error {
    move |e| match e.kind() {
        io::ErrorKind::UnexpectedEof => JP2Error::BoxTruncated { offset },
        _ => JP2Error::Io(e),
    }
}

// I.4 - Box definition
fn decode_box_header<R: io::Read + io::Seek>(
    reader: &mut R,
    offset: u64,
    end: u64,
) -> Result<BoxHeader, JP2Error> {
    if offset + 8 > end {
        return Err(JP2Error::BoxTruncated { offset });
    }

    reader.seek(io::SeekFrom::Start(offset))?;

    let mut box_length: [u8; 4] = [0; 4];
    let mut box_type: BoxType = [0; 4];
    reader
        .read_exact(&mut box_length)
        .map_err(truncated_at(offset))?;
    reader
        .read_exact(&mut box_type)
        .map_err(truncated_at(offset))?;

    let mut header_length = 8;
    let mut extends_to_end = false;

    let box_length = match u32::from_be_bytes(box_length) {
        // Length not known when LBox was written, the box contains all bytes
        // up to the end of its superbox or of the file.
        0 => {
            extends_to_end = true;
            end - offset
        }
        // XLBox holds the actual length, LBox, TBox and XLBox included.
        1 => {
            if offset + 16 > end {
                return Err(JP2Error::BoxTruncated { offset });
            }
            let mut xl_length: [u8; 8] = [0; 8];
            reader
                .read_exact(&mut xl_length)
                .map_err(truncated_at(offset))?;
            header_length = 16;
            u64::from_be_bytes(xl_length)
        }
        // The values 2-7 are reserved for ISO use.
        value @ 2..=7 => {
            return Err(JP2Error::BoxMalformed {
                box_type,
                offset,
                reason: format!("reserved box length {}", value),
            });
        }
        value => value as u64,
    };

    if box_length < header_length as u64 {
        return Err(JP2Error::BoxMalformed {
            box_type,
            offset,
            reason: format!(
                "length {} is smaller than its {} byte header",
                box_length, header_length
            ),
        });
    }
    if box_length > end - offset {
        return Err(JP2Error::BoxMalformed {
            box_type,
            offset,
            reason: format!(
                "length {} exceeds the {} bytes remaining",
                box_length,
                end - offset
            ),
        });
    }

    Ok(BoxHeader {
        box_type,
        box_length,
        header_length,
        extends_to_end,
    })
}

fn decode_contents<R: io::Read + io::Seek>(
    reader: &mut R,
    header: &BoxHeader,
    offset: u64,
) -> Result<Option<BoxContents>, JP2Error> {
    let box_type = header.box_type;
    let descriptive = [
        BOX_TYPE_SIGNATURE,
        BOX_TYPE_FILE_TYPE,
        BOX_TYPE_IMAGE_HEADER,
        BOX_TYPE_COLOUR_SPECIFICATION,
    ];
    if !descriptive.contains(&box_type) {
        return Ok(None);
    }

    let mut payload = vec![0; (header.box_length - header.header_length as u64) as usize];
    reader.read_exact(&mut payload)?;
    let mut payload = io::Cursor::new(payload);

    let malformed = |reason: String| JP2Error::BoxMalformed {
        box_type,
        offset,
        reason,
    };

    let contents = match box_type {
        BOX_TYPE_SIGNATURE => decode_signature(&mut payload).map(BoxContents::Signature),
        BOX_TYPE_FILE_TYPE => decode_file_type(&mut payload)
            .map_err(|e| match e.kind() {
                io::ErrorKind::InvalidData => malformed(e.to_string()),
                _ => JP2Error::Io(e),
            })
            .map(BoxContents::FileType),
        BOX_TYPE_IMAGE_HEADER => decode_image_header(&mut payload).map(BoxContents::ImageHeader),
        _ => decode_colour_specification(&mut payload).map(BoxContents::ColourSpecification),
    }
    .map_err(|e| match e {
        JP2Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            malformed("payload is shorter than the box layout".to_owned())
        }
        e => e,
    })?;

    Ok(Some(contents))
}

// I.5.1
fn decode_signature(payload: &mut io::Cursor<Vec<u8>>) -> Result<SignatureBox, JP2Error> {
    let mut signature = [0; 4];
    payload.read_exact(&mut signature)?;
    debug!("Signature {:?}", signature);
    Ok(SignatureBox { signature })
}

// I.5.2
fn decode_file_type(payload: &mut io::Cursor<Vec<u8>>) -> io::Result<FileTypeBox> {
    let mut file_type = FileTypeBox {
        brand: [0; 4],
        min_version: [0; 4],
        compatibility_list: vec![],
    };
    payload.read_exact(&mut file_type.brand)?;
    payload.read_exact(&mut file_type.min_version)?;

    let mut rest = vec![];
    payload.read_to_end(&mut rest)?;
    if rest.len() % 4 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("compatibility list of {} bytes", rest.len()),
        ));
    }
    file_type.compatibility_list = rest
        .chunks_exact(4)
        .map(|cl| [cl[0], cl[1], cl[2], cl[3]])
        .collect();

    debug!("Brand {:?}", file_type.brand());
    debug!("Min version {:?}", file_type.min_version());
    debug!("Compatibility list {:?}", file_type.compatibility_list());
    Ok(file_type)
}

// I.5.3.1
fn decode_image_header(payload: &mut io::Cursor<Vec<u8>>) -> Result<ImageHeaderBox, JP2Error> {
    let mut image_header = ImageHeaderBox {
        height: [0; 4],
        width: [0; 4],
        components_num: [0; 2],
        components_bits: [0; 1],
        compression_type: [0; 1],
        colourspace_unknown: [0; 1],
        intellectual_property: [0; 1],
    };
    payload.read_exact(&mut image_header.height)?;
    payload.read_exact(&mut image_header.width)?;
    payload.read_exact(&mut image_header.components_num)?;
    payload.read_exact(&mut image_header.components_bits)?;
    payload.read_exact(&mut image_header.compression_type)?;
    payload.read_exact(&mut image_header.colourspace_unknown)?;
    payload.read_exact(&mut image_header.intellectual_property)?;

    debug!(
        "Image header {}x{}, {} components",
        image_header.width(),
        image_header.height(),
        image_header.components_num()
    );
    if image_header.compression_type() != 7 {
        warn!(
            "compression type {} is not ISO/IEC 15444-1",
            image_header.compression_type()
        );
    }
    Ok(image_header)
}

// I.5.3.3
fn decode_colour_specification(
    payload: &mut io::Cursor<Vec<u8>>,
) -> Result<ColourSpecificationBox, JP2Error> {
    let mut colour = ColourSpecificationBox {
        method: [0; 1],
        precedence: [0; 1],
        colourspace_approximation: [0; 1],
        enumerated_colour_space: None,
        restricted_icc_profile: vec![],
    };
    payload.read_exact(&mut colour.method)?;
    payload.read_exact(&mut colour.precedence)?;
    payload.read_exact(&mut colour.colourspace_approximation)?;

    if colour.precedence() != 0 {
        warn!("Precedence {:?} unexpected", colour.precedence());
    }
    if colour.colourspace_approximation() != 0 {
        warn!(
            "Colourspace approximation {:?} unexpected",
            colour.colourspace_approximation()
        );
    }

    match colour.method() {
        ColourSpecificationMethods::EnumeratedColourSpace => {
            let mut enumerated_colour_space = [0; 4];
            payload.read_exact(&mut enumerated_colour_space)?;
            colour.enumerated_colour_space = Some(enumerated_colour_space);
        }
        ColourSpecificationMethods::RestrictedICCProfile => {
            payload.read_to_end(&mut colour.restricted_icc_profile)?;
        }
        ColourSpecificationMethods::Reserved { value } => {
            warn!("reserved colour specification method {}", value);
        }
    }

    debug!("Method {:?}", colour.method());
    debug!("Enumerated colour space {:?}", colour.enumerated_colour_space());
    Ok(colour)
}

fn decode_boxes<R: io::Read + io::Seek>(
    reader: &mut R,
    start: u64,
    end: u64,
) -> Result<Vec<Jp2Box>, JP2Error> {
    let mut boxes = vec![];
    let mut offset = start;

    while offset < end {
        let header = decode_box_header(reader, offset, end)?;
        let name = box_type_str(&header.box_type);
        info!("{} box start at {:?}", name, offset);

        let payload_start = offset + header.header_length as u64;
        let box_end = offset + header.box_length;

        let (contents, children) = if SUPERBOX_TYPES.contains(&header.box_type) {
            (None, decode_boxes(reader, payload_start, box_end)?)
        } else {
            (decode_contents(reader, &header, offset)?, vec![])
        };

        info!("{} box finish at {:?}", name, box_end);
        boxes.push(Jp2Box {
            box_type: header.box_type,
            offset,
            length: header.box_length,
            header_length: header.header_length,
            extends_to_end: header.extends_to_end,
            contents,
            children,
        });
        offset = box_end;
    }

    Ok(boxes)
}

/// Parses a JP2 file, or recognises a bare codestream, from the current
/// position of `reader` to the end of the stream.
///
/// A stream starting with the SOC marker is a bare codestream and has no box
/// tree. Anything else must start with the 12 byte signature box, otherwise
/// the stream is rejected with [`JP2Error::NotJP2Format`].
pub fn decode_jp2<R: io::Read + io::Seek>(reader: &mut R) -> Result<JP2File, JP2Error> {
    let start = reader.stream_position()?;
    let end = reader.seek(io::SeekFrom::End(0))?;
    reader.seek(io::SeekFrom::Start(start))?;
    let length = end - start;

    if length >= 2 {
        let mut magic = [0; 2];
        reader.read_exact(&mut magic)?;
        if magic == CODESTREAM_MAGIC {
            info!("Codestream start at {:?}", start);
            return Ok(JP2File {
                format: FileFormat::Codestream,
                length,
                boxes: vec![],
            });
        }
    }

    if length < 12 {
        return Err(JP2Error::NotJP2Format {
            reason: format!("{} bytes is too short for a signature box", length),
        });
    }

    // The Signature box shall be the first box, 12 bytes long.
    let mut signature = [0; 12];
    reader.seek(io::SeekFrom::Start(start))?;
    reader.read_exact(&mut signature)?;
    if signature[0..4] != [0, 0, 0, 12]
        || signature[4..8] != BOX_TYPE_SIGNATURE
        || signature[8..12] != SIGNATURE_MAGIC
    {
        return Err(JP2Error::NotJP2Format {
            reason: "missing JPEG 2000 signature box".to_owned(),
        });
    }

    let boxes = decode_boxes(reader, start, end)?;
    let file = JP2File {
        format: FileFormat::Jp2,
        length,
        boxes,
    };
    file.check_layout();

    Ok(file)
}
