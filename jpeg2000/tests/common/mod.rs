#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use jpeg2000::{
    CodecEngine, ComponentImage, DecodedComponent, DecodedImage, DecoderParameters,
    DiagnosticSink, EncoderParameters, Error, FileFormat, QualityLayers, Result,
};

/// Precision, signedness and (dy, dx) of one codestream component.
#[derive(Debug, Clone, Copy)]
pub struct Component {
    pub precision: u8,
    pub signed: bool,
    pub dy: u8,
    pub dx: u8,
}

impl Component {
    pub fn unsigned(precision: u8) -> Component {
        Component {
            precision,
            signed: false,
            dy: 1,
            dx: 1,
        }
    }
}

/// Everything the test codestream writer needs.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Image area (rows, cols) on the reference grid.
    pub rows: u32,
    pub cols: u32,
    /// (YOsiz, XOsiz)
    pub grid_offset: (u32, u32),
    /// (YTsiz, XTsiz), the whole grid when absent.
    pub tile_size: Option<(u32, u32)>,
    pub components: Vec<Component>,
    pub levels: u8,
    pub layers: u16,
    pub progression: u8,
    pub coding_style: u8,
    pub mct: bool,
    /// (xcb, ycb) exponent offsets
    pub code_block: (u8, u8),
    pub code_block_style: u8,
    /// PPx | PPy << 4 per resolution, lowest first
    pub precincts: Vec<u8>,
}

impl Layout {
    pub fn new(rows: u32, cols: u32, components: Vec<Component>) -> Layout {
        Layout {
            rows,
            cols,
            grid_offset: (0, 0),
            tile_size: None,
            components,
            levels: 5,
            layers: 1,
            progression: 0,
            coding_style: 0,
            mct: false,
            code_block: (4, 4),
            code_block_style: 0,
            precincts: vec![],
        }
    }

    fn grid(&self) -> (u32, u32) {
        (
            self.grid_offset.0 + self.rows,
            self.grid_offset.1 + self.cols,
        )
    }

    /// (rows, cols) of component `c` at full resolution.
    pub fn component_shape(&self, c: usize) -> (usize, usize) {
        let component = self.components[c];
        let (height, width) = self.grid();
        let rows = height.div_ceil(component.dy as u32)
            - self.grid_offset.0.div_ceil(component.dy as u32);
        let cols = width.div_ceil(component.dx as u32)
            - self.grid_offset.1.div_ceil(component.dx as u32);
        (rows as usize, cols as usize)
    }
}

fn segment(bytes: &mut Vec<u8>, marker: u8, payload: &[u8]) {
    bytes.extend_from_slice(&[0xFF, marker]);
    bytes.extend_from_slice(&(payload.len() as u16 + 2).to_be_bytes());
    bytes.extend_from_slice(payload);
}

/// Codestream holding the planes as raw big endian samples in one tile-part.
pub fn codestream_bytes(layout: &Layout, planes: &[Vec<i32>]) -> Vec<u8> {
    let (height, width) = layout.grid();
    let (tile_height, tile_width) = layout.tile_size.unwrap_or((height, width));
    let mut bytes = vec![0xFF, 0x4F];

    let mut siz = vec![0, 0];
    for value in [
        width,
        height,
        layout.grid_offset.1,
        layout.grid_offset.0,
        tile_width,
        tile_height,
        0,
        0,
    ] {
        siz.extend_from_slice(&value.to_be_bytes());
    }
    siz.extend_from_slice(&(layout.components.len() as u16).to_be_bytes());
    for component in &layout.components {
        let ssiz = (component.precision - 1) | if component.signed { 0x80 } else { 0 };
        siz.extend_from_slice(&[ssiz, component.dx, component.dy]);
    }
    segment(&mut bytes, 0x51, &siz);

    let mut cod = vec![layout.coding_style, layout.progression];
    cod.extend_from_slice(&layout.layers.to_be_bytes());
    cod.extend_from_slice(&[
        layout.mct as u8,
        layout.levels,
        layout.code_block.0,
        layout.code_block.1,
        layout.code_block_style,
        1,
    ]);
    if layout.coding_style & 0x01 != 0 {
        let mut precincts = layout.precincts.clone();
        precincts.resize(layout.levels as usize + 1, 0xFF);
        cod.extend(precincts);
    }
    segment(&mut bytes, 0x52, &cod);

    let mut qcd = vec![0x40];
    qcd.extend(std::iter::repeat(0x48).take(1 + 3 * layout.levels as usize));
    segment(&mut bytes, 0x5C, &qcd);

    let data: Vec<u8> = planes
        .iter()
        .flatten()
        .flat_map(|sample| sample.to_be_bytes())
        .collect();
    let mut sot = vec![0, 0];
    sot.extend_from_slice(&(12 + 2 + data.len() as u32).to_be_bytes());
    sot.extend_from_slice(&[0, 1]);
    segment(&mut bytes, 0x90, &sot);
    bytes.extend_from_slice(&[0xFF, 0x93]);
    bytes.extend(data);
    bytes.extend_from_slice(&[0xFF, 0xD9]);
    bytes
}

pub fn jp2_box(box_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut bytes = (payload.len() as u32 + 8).to_be_bytes().to_vec();
    bytes.extend_from_slice(box_type);
    bytes.extend_from_slice(payload);
    bytes
}

/// Wraps a codestream into signature, file type, JP2 header and codestream
/// boxes.
pub fn jp2_bytes(layout: &Layout, codestream: &[u8], colour_space: u32) -> Vec<u8> {
    let mut bytes = jp2_box(b"jP  ", &[0x0D, 0x0A, 0x87, 0x0A]);

    let mut ftyp = b"jp2 ".to_vec();
    ftyp.extend_from_slice(&[0, 0, 0, 0]);
    ftyp.extend_from_slice(b"jp2 ");
    bytes.extend(jp2_box(b"ftyp", &ftyp));

    let mut ihdr = layout.rows.to_be_bytes().to_vec();
    ihdr.extend_from_slice(&layout.cols.to_be_bytes());
    ihdr.extend_from_slice(&(layout.components.len() as u16).to_be_bytes());
    ihdr.extend_from_slice(&[layout.components[0].precision - 1, 7, 0, 0]);
    let mut colr = vec![1, 0, 0];
    colr.extend_from_slice(&colour_space.to_be_bytes());
    let mut jp2h = jp2_box(b"ihdr", &ihdr);
    jp2h.extend(jp2_box(b"colr", &colr));
    bytes.extend(jp2_box(b"jp2h", &jp2h));

    bytes.extend(jp2_box(b"jp2c", codestream));
    bytes
}

pub fn write_file(path: &Path, layout: &Layout, planes: &[Vec<i32>]) {
    let codestream = codestream_bytes(layout, planes);
    let bytes = match path.extension().and_then(|e| e.to_str()) {
        Some("jp2") => jp2_bytes(layout, &codestream, 16),
        _ => codestream,
    };
    fs::write(path, bytes).expect("test file should be written");
}

/// Planes of `rows * cols` samples counting up from `start`.
pub fn ramp(layout: &Layout, start: i32) -> Vec<Vec<i32>> {
    (0..layout.components.len())
        .map(|c| {
            let (rows, cols) = layout.component_shape(c);
            (0..(rows * cols) as i32).map(|v| start + v + c as i32).collect()
        })
        .collect()
}

/// Scripted engine: encoding stores samples uncompressed in a single
/// tile-part, decoding reads them back through the `jp2` and `jpc` parsers
/// and applies reduction, area and tile selection by subsampling and
/// cropping.
#[derive(Default)]
pub struct MockEngine {
    pub decoded: RefCell<Vec<DecoderParameters>>,
    pub encoded: RefCell<Vec<EncoderParameters>>,
    /// Diagnostics emitted before failing decode with this message
    pub decode_failure: Option<(Vec<String>, String)>,
    /// Replaces the decoded components when set
    pub decode_override: Option<Vec<DecodedComponent>>,
}

impl MockEngine {
    pub fn new() -> MockEngine {
        Default::default()
    }

    pub fn failing(errors: &[&str], failure: &str) -> MockEngine {
        MockEngine {
            decode_failure: Some((
                errors.iter().map(|e| e.to_string()).collect(),
                failure.to_owned(),
            )),
            ..Default::default()
        }
    }

    pub fn decode_count(&self) -> usize {
        self.decoded.borrow().len()
    }

    pub fn last_encoded(&self) -> EncoderParameters {
        self.encoded
            .borrow()
            .last()
            .cloned()
            .expect("encode should have been called")
    }

    pub fn last_decoded(&self) -> DecoderParameters {
        self.decoded
            .borrow()
            .last()
            .cloned()
            .expect("decode should have been called")
    }
}

fn precincts(parameters: &EncoderParameters, levels: u8) -> Vec<u8> {
    // Given finest first, stored lowest resolution first
    let mut finest_first: Vec<u8> = parameters
        .precincts
        .iter()
        .map(|(h, w)| (w.trailing_zeros() as u8) | ((h.trailing_zeros() as u8) << 4))
        .collect();
    let last = finest_first.last().copied().unwrap_or(0xFF);
    finest_first.resize(levels as usize + 1, last);
    finest_first.reverse();
    finest_first
}

impl CodecEngine for MockEngine {
    fn decode(
        &self,
        path: &Path,
        format: FileFormat,
        parameters: &DecoderParameters,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<DecodedImage> {
        self.decoded.borrow_mut().push(parameters.clone());
        sink.info(&format!("decoding {:?} as {}", path, format));

        if let Some((errors, failure)) = &self.decode_failure {
            for error in errors {
                sink.error(error);
            }
            return Err(Error::Engine(failure.clone()));
        }
        if let Some(components) = &self.decode_override {
            return Ok(DecodedImage {
                components: components.clone(),
            });
        }

        let bytes = fs::read(path)?;
        let mut reader = std::io::Cursor::new(bytes.clone());
        let file = jp2::decode_jp2(&mut reader).map_err(|e| Error::Engine(e.to_string()))?;
        let (start, length) = match format {
            FileFormat::Jp2 => {
                let jp2c = file
                    .codestream_box()
                    .map_err(|e| Error::Engine(e.to_string()))?;
                (jp2c.payload_offset(), jp2c.payload_length())
            }
            FileFormat::Codestream => (0, bytes.len() as u64),
        };
        reader.set_position(start);
        let codestream = jpc::decode_jpc_range(&mut reader, length, false)
            .map_err(|e| Error::Engine(e.to_string()))?;
        let siz = codestream
            .siz()
            .ok_or_else(|| Error::Engine("no SIZ".to_owned()))?;
        let sod = codestream
            .segments()
            .iter()
            .find_map(|segment| match segment {
                jpc::Segment::Sod { offset } => Some(*offset as usize + 2),
                _ => None,
            })
            .ok_or_else(|| Error::Engine("no tile data".to_owned()))?;

        let levels = codestream
            .cod()
            .ok_or_else(|| Error::Engine("no COD".to_owned()))?
            .coding_style_parameters()
            .no_decomposition_levels();
        if parameters.reduce > levels {
            sink.error(&format!(
                "The number of resolutions to remove ({}) is greater or equal than the number of resolutions of this component ({})",
                parameters.reduce,
                levels + 1
            ));
            return Err(Error::Engine("opj_read_header failed".to_owned()));
        }

        // Reference grid region to decode, a tile overriding the area
        let (mut y0, mut x0) = (siz.image_vertical_offset(), siz.image_horizontal_offset());
        let (mut y1, mut x1) = (siz.reference_grid_height(), siz.reference_grid_width());
        if let (Some(area), None) = (parameters.area, parameters.tile) {
            y0 = y0.max(area.y0);
            x0 = x0.max(area.x0);
            y1 = y1.min(area.y1);
            x1 = x1.min(area.x1);
        }
        if let Some(tile) = parameters.tile {
            let across = siz.num_x_tiles();
            let count = across * siz.num_y_tiles();
            if tile >= count {
                sink.error(&format!(
                    "Tile index provided by the user is incorrect {} (max = {})",
                    tile,
                    count - 1
                ));
                return Err(Error::Engine("opj_get_decoded_tile failed".to_owned()));
            }
            let (row, col) = (tile / across, tile % across);
            y0 = y0.max(row * siz.reference_tile_height());
            x0 = x0.max(col * siz.reference_tile_width());
            y1 = y1.min((row + 1) * siz.reference_tile_height());
            x1 = x1.min((col + 1) * siz.reference_tile_width());
        }

        let mut position = sod;
        let mut components = vec![];
        for component in siz.components() {
            let (dy, dx) = (
                component.vertical_separation() as u32,
                component.horizontal_separation() as u32,
            );
            let first_row = siz.image_vertical_offset().div_ceil(dy);
            let first_col = siz.image_horizontal_offset().div_ceil(dx);
            let rows = siz.reference_grid_height().div_ceil(dy) - first_row;
            let cols = siz.reference_grid_width().div_ceil(dx) - first_col;

            let samples: Vec<i32> = bytes[position..position + (rows * cols) as usize * 4]
                .chunks_exact(4)
                .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            position += samples.len() * 4;

            let step = 1u32 << parameters.reduce;
            let r0 = y0.div_ceil(dy) - first_row;
            let r1 = y1.div_ceil(dy) - first_row;
            let c0 = x0.div_ceil(dx) - first_col;
            let c1 = x1.div_ceil(dx) - first_col;
            let mut data = vec![];
            let mut height = 0;
            let mut width = 0;
            for r in (r0..r1).step_by(step as usize) {
                height += 1;
                width = 0;
                for c in (c0..c1).step_by(step as usize) {
                    width += 1;
                    data.push(samples[(r * cols + c) as usize]);
                }
            }

            components.push(DecodedComponent {
                width,
                height,
                precision: component.precision(),
                signed: component.values_are_signed(),
                dx,
                dy,
                data,
            });
        }

        Ok(DecodedImage { components })
    }

    fn encode(
        &self,
        path: &Path,
        format: FileFormat,
        parameters: &EncoderParameters,
        image: &ComponentImage,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<()> {
        self.encoded.borrow_mut().push(parameters.clone());
        sink.info(&format!("encoding {:?} as {}", path, format));

        let (dy, dx) = parameters.subsampling;
        let levels = parameters.resolutions.unwrap_or(6) - 1;
        let mut layout = Layout::new(
            image.rows as u32,
            image.cols as u32,
            vec![
                Component {
                    precision: image.precision,
                    signed: image.signed,
                    dy,
                    dx,
                };
                image.components.len()
            ],
        );
        let (y1, x1) = parameters.image_end(image.rows, image.cols)?;
        layout.rows = y1 - parameters.grid_offset.0;
        layout.cols = x1 - parameters.grid_offset.1;
        layout.grid_offset = parameters.grid_offset;
        layout.tile_size = parameters.tile_size;
        layout.levels = levels;
        layout.layers = parameters.layers.len() as u16;
        layout.progression = parameters.progression.value();
        layout.coding_style = parameters.coding_style.bits();
        layout.mct = parameters.mct;
        if let Some((height, width)) = parameters.code_block {
            layout.code_block = (
                width.trailing_zeros() as u8 - 2,
                height.trailing_zeros() as u8 - 2,
            );
        }
        layout.code_block_style = parameters.code_block_style.bits();
        layout.precincts = precincts(parameters, levels);
        if let QualityLayers::Psnr(_) = parameters.layers {
            sink.warning("PSNR targets are ignored by the test engine");
        }

        let codestream = codestream_bytes(&layout, &image.components);
        let bytes = match format {
            FileFormat::Jp2 => {
                let colour_space = match parameters.colorspace {
                    jpeg2000::Colorspace::Srgb => 16,
                    jpeg2000::Colorspace::Gray => 17,
                };
                jp2_bytes(&layout, &codestream, colour_space)
            }
            FileFormat::Codestream => codestream,
        };
        fs::write(path, bytes)?;
        Ok(())
    }
}
