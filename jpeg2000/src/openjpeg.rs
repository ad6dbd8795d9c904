//! [`CodecEngine`] over the OpenJPEG C library.

#![allow(unsafe_code)] // FFI

use crate::diagnostics::DiagnosticSink;
use crate::engine::{CodecEngine, ComponentImage, DecodedComponent, DecodedImage};
use crate::error::{Error, Result};
use crate::options::{Colorspace, DecoderParameters, EncoderParameters, QualityLayers};
use jp2::FileFormat;
use jpc::ProgressionOrder;
use log::debug;
use openjpeg_sys as opj;
use std::ffi::{c_char, c_void, CStr, CString};
use std::mem::MaybeUninit;
use std::path::Path;
use std::ptr::{self, NonNull};

/// Engine backed by OpenJPEG file streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenJpeg;

struct Handlers<'a> {
    sink: &'a mut dyn DiagnosticSink,
}

fn message(message: *const c_char) -> String {
    if message.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned()
}

unsafe extern "C" fn info_handler(msg: *const c_char, client_data: *mut c_void) {
    if let Some(handlers) = (client_data as *mut Handlers).as_mut() {
        handlers.sink.info(&message(msg));
    }
}

unsafe extern "C" fn warning_handler(msg: *const c_char, client_data: *mut c_void) {
    if let Some(handlers) = (client_data as *mut Handlers).as_mut() {
        handlers.sink.warning(&message(msg));
    }
}

unsafe extern "C" fn error_handler(msg: *const c_char, client_data: *mut c_void) {
    if let Some(handlers) = (client_data as *mut Handlers).as_mut() {
        handlers.sink.error(&message(msg));
    }
}

struct Stream(NonNull<opj::opj_stream_t>);

impl Drop for Stream {
    fn drop(&mut self) {
        unsafe {
            opj::opj_stream_destroy(self.0.as_ptr());
        }
    }
}

impl Stream {
    fn from_file(path: &Path, is_read_stream: bool) -> Result<Self> {
        let file_name = path
            .to_str()
            .and_then(|name| CString::new(name).ok())
            .ok_or_else(|| Error::Engine(format!("path {:?} cannot be passed to OpenJPEG", path)))?;
        let stream = unsafe {
            opj::opj_stream_create_default_file_stream(file_name.as_ptr(), is_read_stream as i32)
        };
        NonNull::new(stream)
            .map(Stream)
            .ok_or_else(|| Error::Engine(format!("failed to open a stream on {:?}", path)))
    }

    fn as_raw(&self) -> *mut opj::opj_stream_t {
        self.0.as_ptr()
    }
}

struct Codec(NonNull<opj::opj_codec_t>);

impl Drop for Codec {
    fn drop(&mut self) {
        unsafe {
            opj::opj_destroy_codec(self.0.as_ptr());
        }
    }
}

fn codec_format(format: FileFormat) -> opj::OPJ_CODEC_FORMAT {
    match format {
        FileFormat::Jp2 => opj::OPJ_CODEC_FORMAT::OPJ_CODEC_JP2,
        FileFormat::Codestream => opj::OPJ_CODEC_FORMAT::OPJ_CODEC_J2K,
    }
}

impl Codec {
    fn decompress(format: FileFormat) -> Result<Self> {
        NonNull::new(unsafe { opj::opj_create_decompress(codec_format(format)) })
            .map(Codec)
            .ok_or_else(|| Error::Engine("failed to create the decoder".to_owned()))
    }

    fn compress(format: FileFormat) -> Result<Self> {
        NonNull::new(unsafe { opj::opj_create_compress(codec_format(format)) })
            .map(Codec)
            .ok_or_else(|| Error::Engine("failed to create the encoder".to_owned()))
    }

    // `handlers` must outlive the codec.
    fn set_handlers(&self, handlers: &mut Handlers, verbose: bool) {
        let client_data = handlers as *mut Handlers as *mut c_void;
        unsafe {
            if verbose {
                opj::opj_set_info_handler(self.as_raw(), Some(info_handler), client_data);
            } else {
                opj::opj_set_info_handler(self.as_raw(), None, ptr::null_mut());
            }
            opj::opj_set_warning_handler(self.as_raw(), Some(warning_handler), client_data);
            opj::opj_set_error_handler(self.as_raw(), Some(error_handler), client_data);
        }
    }

    fn as_raw(&self) -> *mut opj::opj_codec_t {
        self.0.as_ptr()
    }
}

struct Image(NonNull<opj::opj_image_t>);

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            opj::opj_image_destroy(self.0.as_ptr());
        }
    }
}

impl Image {
    fn from_header(stream: &Stream, codec: &Codec) -> Result<Self> {
        let mut image = ptr::null_mut();
        if unsafe { opj::opj_read_header(stream.as_raw(), codec.as_raw(), &mut image) } != 1 {
            // A partially read header may still have allocated the image.
            if let Some(image) = NonNull::new(image) {
                drop(Image(image));
            }
            return Err(Error::Engine("failed to read the main header".to_owned()));
        }
        NonNull::new(image)
            .map(Image)
            .ok_or_else(|| Error::Engine("failed to read the main header".to_owned()))
    }

    fn create(
        parameters: &mut [opj::opj_image_cmptparm_t],
        colorspace: opj::OPJ_COLOR_SPACE,
    ) -> Result<Self> {
        NonNull::new(unsafe {
            opj::opj_image_create(parameters.len() as u32, parameters.as_mut_ptr(), colorspace)
        })
        .map(Image)
        .ok_or_else(|| Error::Engine("failed to create the image to encode".to_owned()))
    }

    fn as_raw(&self) -> *mut opj::opj_image_t {
        self.0.as_ptr()
    }

    fn components(&self) -> &[opj::opj_image_comp_t] {
        let image = unsafe { self.0.as_ref() };
        if image.comps.is_null() {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(image.comps, image.numcomps as usize) }
    }

    fn components_mut(&mut self) -> &mut [opj::opj_image_comp_t] {
        let image = unsafe { self.0.as_mut() };
        if image.comps.is_null() {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(image.comps, image.numcomps as usize) }
    }
}

fn default_decoder_parameters() -> opj::opj_dparameters_t {
    let mut parameters = MaybeUninit::zeroed();
    unsafe {
        opj::opj_set_default_decoder_parameters(parameters.as_mut_ptr());
        parameters.assume_init()
    }
}

fn default_encoder_parameters() -> opj::opj_cparameters_t {
    let mut parameters = MaybeUninit::zeroed();
    unsafe {
        opj::opj_set_default_encoder_parameters(parameters.as_mut_ptr());
        parameters.assume_init()
    }
}

fn progression_order(progression: ProgressionOrder) -> Result<opj::OPJ_PROG_ORDER> {
    match progression {
        ProgressionOrder::Lrcp => Ok(opj::OPJ_PROG_ORDER::OPJ_LRCP),
        ProgressionOrder::Rlcp => Ok(opj::OPJ_PROG_ORDER::OPJ_RLCP),
        ProgressionOrder::Rpcl => Ok(opj::OPJ_PROG_ORDER::OPJ_RPCL),
        ProgressionOrder::Pcrl => Ok(opj::OPJ_PROG_ORDER::OPJ_PCRL),
        ProgressionOrder::Cprl => Ok(opj::OPJ_PROG_ORDER::OPJ_CPRL),
        ProgressionOrder::Reserved { value } => Err(Error::Configuration(format!(
            "reserved progression order {}",
            value
        ))),
    }
}

fn encoder_parameters(parameters: &EncoderParameters) -> Result<opj::opj_cparameters_t> {
    let mut cparameters = default_encoder_parameters();

    match &parameters.layers {
        QualityLayers::Rates(rates) => {
            cparameters.tcp_numlayers = rates.len() as _;
            for (j, rate) in rates.iter().enumerate() {
                cparameters.tcp_rates[j] = *rate;
            }
            cparameters.cp_disto_alloc = 1;
        }
        QualityLayers::Psnr(psnr) => {
            cparameters.tcp_numlayers = psnr.len() as _;
            for (j, snr) in psnr.iter().enumerate() {
                cparameters.tcp_distoratio[j] = *snr;
            }
            cparameters.cp_fixed_quality = 1;
        }
    }

    if let Some((height, width)) = parameters.code_block {
        cparameters.cblockw_init = width as _;
        cparameters.cblockh_init = height as _;
    }

    for (j, (height, width)) in parameters.precincts.iter().enumerate() {
        cparameters.prcw_init[j] = *width as _;
        cparameters.prch_init[j] = *height as _;
    }
    cparameters.res_spec = parameters.precincts.len() as _;

    cparameters.csty = parameters.coding_style.bits() as _;
    cparameters.mode = parameters.code_block_style.bits() as _;

    if let Some(numres) = parameters.resolutions {
        cparameters.numresolution = numres as _;
    }

    cparameters.prog_order = progression_order(parameters.progression)?;

    cparameters.image_offset_y0 = parameters.grid_offset.0 as _;
    cparameters.image_offset_x0 = parameters.grid_offset.1 as _;

    cparameters.subsampling_dy = parameters.subsampling.0 as _;
    cparameters.subsampling_dx = parameters.subsampling.1 as _;

    if let Some((rows, cols)) = parameters.tile_size {
        cparameters.cp_tdy = rows as _;
        cparameters.cp_tdx = cols as _;
        cparameters.tile_size_on = 1;
    }

    cparameters.tcp_mct = parameters.mct as _;

    Ok(cparameters)
}

fn check(result: opj::OPJ_BOOL, step: &str) -> Result<()> {
    if result != 1 {
        return Err(Error::Engine(format!("{} failed", step)));
    }
    Ok(())
}

impl CodecEngine for OpenJpeg {
    fn decode(
        &self,
        path: &Path,
        format: FileFormat,
        parameters: &DecoderParameters,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<DecodedImage> {
        let mut handlers = Handlers { sink };

        let mut dparameters = default_decoder_parameters();
        dparameters.cp_reduce = parameters.reduce as _;
        dparameters.cp_layer = parameters.layer as _;
        if let Some(tile) = parameters.tile {
            dparameters.tile_index = tile as _;
            dparameters.nb_tile_to_decode = 1;
        }

        let stream = Stream::from_file(path, true)?;
        let codec = Codec::decompress(format)?;
        codec.set_handlers(&mut handlers, parameters.verbose);

        check(
            unsafe { opj::opj_setup_decoder(codec.as_raw(), &mut dparameters) },
            "opj_setup_decoder",
        )?;
        let image = Image::from_header(&stream, &codec)?;

        match parameters.tile {
            Some(tile) => check(
                unsafe {
                    opj::opj_get_decoded_tile(codec.as_raw(), stream.as_raw(), image.as_raw(), tile)
                },
                "opj_get_decoded_tile",
            )?,
            None => {
                if let Some(area) = parameters.area {
                    let coordinate = |value: u32| {
                        i32::try_from(value).map_err(|_| {
                            Error::DecodeArea(format!("coordinate {} exceeds the reference grid", value))
                        })
                    };
                    let (x0, y0) = (coordinate(area.x0)?, coordinate(area.y0)?);
                    let (x1, y1) = (coordinate(area.x1)?, coordinate(area.y1)?);
                    check(
                        unsafe { opj::opj_set_decode_area(codec.as_raw(), image.as_raw(), x0, y0, x1, y1) },
                        "opj_set_decode_area",
                    )?;
                }
                check(
                    unsafe { opj::opj_decode(codec.as_raw(), stream.as_raw(), image.as_raw()) },
                    "opj_decode",
                )?;
                check(
                    unsafe { opj::opj_end_decompress(codec.as_raw(), stream.as_raw()) },
                    "opj_end_decompress",
                )?;
            }
        }

        let mut components = vec![];
        for (k, component) in image.components().iter().enumerate() {
            let length = component.w as usize * component.h as usize;
            let data = if length == 0 {
                vec![]
            } else if component.data.is_null() {
                return Err(Error::Engine(format!("component {} holds no samples", k)));
            } else {
                unsafe { std::slice::from_raw_parts(component.data, length) }.to_vec()
            };
            debug!(
                "decoded component {}: {} x {}, {} bits",
                k, component.h, component.w, component.prec
            );
            components.push(DecodedComponent {
                width: component.w,
                height: component.h,
                precision: u8::try_from(component.prec).unwrap_or(u8::MAX),
                signed: component.sgnd != 0,
                dx: component.dx,
                dy: component.dy,
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
        let mut handlers = Handlers { sink };
        let mut cparameters = encoder_parameters(parameters)?;

        let (dy, dx) = (parameters.subsampling.0 as u32, parameters.subsampling.1 as u32);
        let (y0, x0) = parameters.grid_offset;
        let rows = u32::try_from(image.rows)
            .map_err(|_| Error::Configuration(format!("{} rows do not fit the codestream", image.rows)))?;
        let cols = u32::try_from(image.cols)
            .map_err(|_| Error::Configuration(format!("{} columns do not fit the codestream", image.cols)))?;

        let mut component_parameters: Vec<opj::opj_image_cmptparm_t> = image
            .components
            .iter()
            .map(|_| opj::opj_image_cmptparm_t {
                dx,
                dy,
                w: cols,
                h: rows,
                x0,
                y0,
                prec: image.precision as u32,
                bpp: image.precision as u32,
                sgnd: image.signed as u32,
            })
            .collect();
        let colorspace = match parameters.colorspace {
            Colorspace::Srgb => opj::OPJ_COLOR_SPACE::OPJ_CLRSPC_SRGB,
            Colorspace::Gray => opj::OPJ_COLOR_SPACE::OPJ_CLRSPC_GRAY,
        };
        let (y1, x1) = parameters.image_end(image.rows, image.cols)?;
        let mut native = Image::create(&mut component_parameters, colorspace)?;

        // Image area on the reference grid
        unsafe {
            let raw = native.0.as_mut();
            raw.x0 = x0;
            raw.y0 = y0;
            raw.x1 = x1;
            raw.y1 = y1;
        }

        for (component, plane) in native.components_mut().iter_mut().zip(&image.components) {
            if component.data.is_null() {
                return Err(Error::Engine("image component without storage".to_owned()));
            }
            unsafe {
                ptr::copy_nonoverlapping(plane.as_ptr(), component.data, plane.len());
            }
        }

        let codec = Codec::compress(format)?;
        codec.set_handlers(&mut handlers, parameters.verbose);
        check(
            unsafe { opj::opj_setup_encoder(codec.as_raw(), &mut cparameters, native.as_raw()) },
            "opj_setup_encoder",
        )?;

        let stream = Stream::from_file(path, false)?;
        check(
            unsafe { opj::opj_start_compress(codec.as_raw(), native.as_raw(), stream.as_raw()) },
            "opj_start_compress",
        )?;
        check(
            unsafe { opj::opj_encode(codec.as_raw(), stream.as_raw()) },
            "opj_encode",
        )?;
        check(
            unsafe { opj::opj_end_compress(codec.as_raw(), stream.as_raw()) },
            "opj_end_compress",
        )?;

        Ok(())
    }
}
