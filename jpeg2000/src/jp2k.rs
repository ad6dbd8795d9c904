use crate::diagnostics::LogSink;
use crate::engine::{CodecEngine, ComponentImage, DecodedComponent, DecodedImage};
use crate::error::{Error, Result};
use crate::geometry::{Geometry, SampleType};
use crate::image::{planes, ImageData, Sample};
use crate::options::{DecoderParameters, ReadOptions, WriteOptions};
use jp2::{decode_jp2, FileFormat, JP2File};
use jpc::{decode_jpc, decode_jpc_range, Codestream};
use log::{debug, info};
use ndarray::{ArrayView, ArrayView3, Axis, Dimension, Ix2, Ix3};
use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Seek};
use std::path::{Path, PathBuf};

/// A JPEG 2000 file, either a JP2 container or a bare codestream.
///
/// Opening a file parses its box tree; pixel data only moves through a
/// [`CodecEngine`] in [`Jp2k::read`], [`Jp2k::read_bands`] and
/// [`Jp2k::write`].
#[derive(Debug, Clone)]
pub struct Jp2k {
    path: PathBuf,
    format: FileFormat,
    // None until a created file has been written
    file: Option<JP2File>,
}

fn parse_file(path: &Path) -> Result<JP2File> {
    let mut reader = BufReader::new(File::open(path)?);
    Ok(decode_jp2(&mut reader)?)
}

impl Jp2k {
    /// Opens and parses an existing file.
    pub fn open(path: impl AsRef<Path>) -> Result<Jp2k> {
        let path = path.as_ref().to_path_buf();
        let file = parse_file(&path)?;
        info!("opened {:?} as {}", path, file.format());

        Ok(Jp2k {
            format: file.format(),
            path,
            file: Some(file),
        })
    }

    /// Prepares a file to be written. A `.jp2` extension selects the JP2
    /// container, anything else a bare codestream.
    pub fn create(path: impl AsRef<Path>) -> Jp2k {
        let path = path.as_ref().to_path_buf();
        let format = match path.extension().and_then(OsStr::to_str) {
            Some(extension) if extension.eq_ignore_ascii_case("jp2") => FileFormat::Jp2,
            _ => FileFormat::Codestream,
        };

        Jp2k {
            path,
            format,
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Parsed box tree, `None` for a created file not yet written.
    pub fn file(&self) -> Option<&JP2File> {
        self.file.as_ref()
    }

    /// Parses the codestream, stopping after the main header when
    /// `header_only` is set.
    pub fn codestream(&self, header_only: bool) -> Result<Codestream> {
        let mut reader = BufReader::new(File::open(&self.path)?);

        let codestream = match self.format {
            FileFormat::Jp2 => {
                let parsed;
                let file = match &self.file {
                    Some(file) => file,
                    None => {
                        parsed = decode_jp2(&mut reader)?;
                        &parsed
                    }
                };
                let codestream_box = file.codestream_box()?;
                reader.seek(io::SeekFrom::Start(codestream_box.payload_offset()))?;
                decode_jpc_range(&mut reader, codestream_box.payload_length(), header_only)?
            }
            FileFormat::Codestream => decode_jpc(&mut reader, header_only)?,
        };

        Ok(codestream)
    }

    /// Layout of the image from the main header.
    pub fn geometry(&self) -> Result<Geometry> {
        Geometry::from_codestream(&self.codestream(true)?)
    }

    fn decode(&self, engine: &dyn CodecEngine, parameters: &DecoderParameters) -> Result<DecodedImage> {
        debug!("decoding {:?} with {:?}", self.path, parameters);

        let mut sink = LogSink::new(parameters.verbose);
        let image = match engine.decode(&self.path, self.format, parameters, &mut sink) {
            Ok(image) => image,
            Err(Error::Engine(failure)) => return Err(sink.into_error(&failure)),
            Err(error) => return Err(error),
        };

        if image.components.is_empty() {
            return Err(Error::Engine("decoded image has no components".to_owned()));
        }
        for (k, component) in image.components.iter().enumerate() {
            if component.width == 0 || component.height == 0 {
                return Err(Error::Engine(format!(
                    "component {} has dimensions {} x {}",
                    k, component.height, component.width
                )));
            }
            let expected = component.width as usize * component.height as usize;
            if component.data.len() != expected {
                return Err(Error::Engine(format!(
                    "component {} holds {} samples, expected {}",
                    k,
                    component.data.len(),
                    expected
                )));
            }
        }

        Ok(image)
    }

    /// Decodes every component into one (rows, cols, components) buffer.
    ///
    /// All components must share the same subsampling and sample type;
    /// [`Jp2k::read_bands`] handles files where they differ. The result
    /// always has three axes, a single component image being
    /// (rows, cols, 1); [`ImageData::band`] views it as (rows, cols).
    pub fn read(&self, engine: &dyn CodecEngine, options: &ReadOptions) -> Result<ImageData> {
        let geometry = self.geometry()?;
        geometry.uniform_subsampling()?;
        let parameters = options.validate(&geometry)?;
        geometry.sample_type()?;

        let image = self.decode(engine, &parameters)?;

        let first = &image.components[0];
        let sample_type = SampleType::common(
            image
                .components
                .iter()
                .map(|component| (component.precision, component.signed)),
        )?;
        for (k, component) in image.components.iter().enumerate().skip(1) {
            if component.width != first.width || component.height != first.height {
                return Err(Error::Engine(format!(
                    "component {} is {} x {} while component 0 is {} x {}",
                    k, component.height, component.width, first.height, first.width
                )));
            }
        }

        let components: Vec<&DecodedComponent> = image.components.iter().collect();
        let data = ImageData::from_components(
            sample_type,
            first.height as usize,
            first.width as usize,
            &components,
        );
        info!("read {:?}: {:?} {:?}", self.path, data.shape(), sample_type);

        Ok(data)
    }

    /// Decodes each component into its own (rows, cols, 1) buffer, allowing
    /// components of different subsampling.
    pub fn read_bands(&self, engine: &dyn CodecEngine, options: &ReadOptions) -> Result<Vec<ImageData>> {
        let geometry = self.geometry()?;
        let parameters = options.validate(&geometry)?;
        for component in geometry.components() {
            SampleType::for_precision(component.precision, component.signed)?;
        }

        let image = self.decode(engine, &parameters)?;

        image
            .components
            .iter()
            .map(|component| {
                let sample_type = SampleType::for_precision(component.precision, component.signed)?;
                Ok(ImageData::from_components(
                    sample_type,
                    component.height as usize,
                    component.width as usize,
                    &[component],
                ))
            })
            .collect()
    }

    /// Compresses `data`, of shape (rows, cols) or (rows, cols, components),
    /// into this file and re-parses the result.
    pub fn write<T: Sample, D: Dimension>(
        &mut self,
        engine: &dyn CodecEngine,
        data: ArrayView<T, D>,
        options: &WriteOptions,
    ) -> Result<()> {
        let data: ArrayView3<T> = match data.ndim() {
            2 => data
                .into_dimensionality::<Ix2>()
                .map_err(|e| Error::Configuration(e.to_string()))?
                .insert_axis(Axis(2)),
            3 => data
                .into_dimensionality::<Ix3>()
                .map_err(|e| Error::Configuration(e.to_string()))?,
            n => {
                return Err(Error::Configuration(format!(
                    "{}D imagery is not allowed",
                    n
                )))
            }
        };
        let (rows, cols, num_components) = data.dim();

        let parameters = options.validate(self.format, num_components)?;

        let precision = T::WRITE_PRECISION.ok_or_else(|| {
            Error::Configuration(format!(
                "{} samples cannot be written, only u8 and u16 are supported",
                std::any::type_name::<T>()
            ))
        })?;
        if rows == 0 || cols == 0 || num_components == 0 {
            return Err(Error::Configuration(format!(
                "cannot write an empty image of shape {:?}",
                (rows, cols, num_components)
            )));
        }
        parameters.image_end(rows, cols)?;

        let image = ComponentImage {
            rows,
            cols,
            precision,
            signed: false,
            components: planes(&data),
        };

        debug!("encoding {:?} with {:?}", self.path, parameters);
        let mut sink = LogSink::new(parameters.verbose);
        match engine.encode(&self.path, self.format, &parameters, &image, &mut sink) {
            Ok(()) => {}
            Err(Error::Engine(failure)) => return Err(sink.into_error(&failure)),
            Err(error) => return Err(error),
        }

        self.file = Some(parse_file(&self.path)?);
        info!(
            "wrote {:?}: {} x {} x {}, {} bits",
            self.path, rows, cols, num_components, precision
        );

        Ok(())
    }
}

impl fmt::Display for Jp2k {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "File:  {}", self.path.display())?;

        if let Some(file) = &self.file {
            if file.format() == FileFormat::Jp2 {
                write!(f, "\n{}", file)?;
            }
            match self.codestream(true) {
                Ok(codestream) => write!(f, "\n{}", codestream)?,
                Err(error) => write!(f, "\nCodestream unavailable: {}", error)?,
            }
        }

        Ok(())
    }
}
