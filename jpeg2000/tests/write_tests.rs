mod common;

use common::MockEngine;
use jp2::ENUMERATED_COLOUR_SPACE_GREYSCALE;
use jpc::{CodeBlockStyle, CodingStyle, MultipleComponentTransformation, ProgressionOrder};
use jpeg2000::{Colorspace, Error, FileFormat, ImageData, Jp2k, QualityLayers, ReadOptions, WriteOptions};
use ndarray::{Array, Array1, Array2, Array3, Array4};
use tempfile::tempdir;

fn rgb(rows: usize, cols: usize) -> Array3<u8> {
    Array3::from_shape_fn((rows, cols, 3), |(r, c, k)| ((r * 7 + c * 3 + k * 11) % 256) as u8)
}

fn gray16(rows: usize, cols: usize) -> Array2<u16> {
    Array2::from_shape_fn((rows, cols), |(r, c)| (r * 1000 + c * 17) as u16)
}

#[test]
fn test_round_trip_jp2() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rgb.jp2");
    let engine = MockEngine::new();
    let data = rgb(32, 48);

    let mut jp2k = Jp2k::create(&path);
    assert_eq!(jp2k.format(), FileFormat::Jp2);
    assert!(jp2k.file().is_none());
    jp2k.write(&engine, data.view(), &WriteOptions::new()).unwrap();

    // Box tree refreshed after the write
    let file = jp2k.file().expect("written file is parsed");
    assert_eq!(file.format(), FileFormat::Jp2);
    assert!(file.codestream_box().is_ok());
    assert_eq!(file.image_header().map(|h| (h.height(), h.width())), Some((32, 48)));

    let read = Jp2k::open(&path).unwrap().read(&engine, &ReadOptions::new()).unwrap();
    assert_eq!(read, ImageData::U8(data));
}

#[test]
fn test_round_trip_codestream() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gray.j2k");
    let engine = MockEngine::new();
    let data = gray16(20, 30);

    let mut jp2k = Jp2k::create(&path);
    assert_eq!(jp2k.format(), FileFormat::Codestream);
    jp2k.write(&engine, data.view(), &WriteOptions::new()).unwrap();
    assert!(jp2k.file().unwrap().boxes().is_empty());

    let geometry = jp2k.geometry().unwrap();
    assert_eq!((geometry.rows(), geometry.cols()), (20, 30));
    assert_eq!(geometry.num_components(), 1);
    assert_eq!(geometry.components()[0].precision, 16);

    let read = jp2k.read(&engine, &ReadOptions::new()).unwrap();
    assert_eq!(read.shape(), (20, 30, 1));
    let expected = data.insert_axis(ndarray::Axis(2));
    assert_eq!(read.as_u16(), Some(&expected));
}

#[test]
fn test_format_by_extension() {
    assert_eq!(Jp2k::create("a.jp2").format(), FileFormat::Jp2);
    assert_eq!(Jp2k::create("a.JP2").format(), FileFormat::Jp2);
    assert_eq!(Jp2k::create("a.j2k").format(), FileFormat::Codestream);
    assert_eq!(Jp2k::create("a.jpc").format(), FileFormat::Codestream);
    assert_eq!(Jp2k::create("a").format(), FileFormat::Codestream);
}

#[test]
fn test_lossless_defaults() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();

    Jp2k::create(dir.path().join("rgb.jp2"))
        .write(&engine, rgb(8, 8).view(), &WriteOptions::new())
        .unwrap();
    let parameters = engine.last_encoded();
    assert_eq!(parameters.layers, QualityLayers::Rates(vec![0.0]));
    assert_eq!(parameters.progression, ProgressionOrder::Lrcp);
    assert_eq!(parameters.code_block, None);
    assert!(parameters.precincts.is_empty());
    assert_eq!(parameters.resolutions, None);
    assert_eq!(parameters.tile_size, None);
    assert_eq!(parameters.coding_style, CodingStyle::empty());
    assert_eq!(parameters.code_block_style, CodeBlockStyle::empty());
    assert_eq!(parameters.grid_offset, (0, 0));
    assert_eq!(parameters.subsampling, (1, 1));
    assert!(!parameters.mct);
    assert_eq!(parameters.colorspace, Colorspace::Srgb);

    Jp2k::create(dir.path().join("gray.jp2"))
        .write(&engine, gray16(8, 8).view(), &WriteOptions::new())
        .unwrap();
    assert_eq!(engine.last_encoded().colorspace, Colorspace::Gray);
}

#[test]
fn test_code_block_sizes() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();
    let data = rgb(16, 16);

    for (i, (height, width, ok)) in [(5, 5, false), (4, 4, true), (64, 128, false), (64, 64, true), (2, 2, false)]
        .into_iter()
        .enumerate()
    {
        let path = dir.path().join(format!("cb{}.j2k", i));
        let result = Jp2k::create(&path).write(
            &engine,
            data.view(),
            &WriteOptions::new().with_cbsize(height, width),
        );
        if ok {
            assert!(result.is_ok(), "({}, {}) should be accepted", height, width);
            assert_eq!(engine.last_encoded().code_block, Some((height, width)));
        } else {
            assert!(
                matches!(result, Err(Error::Configuration(_))),
                "({}, {}) should be rejected",
                height,
                width
            );
            assert!(!path.exists());
        }
    }

    // 64 x 64 code-blocks show up as xcb = ycb = 4 in COD
    let jp2k = Jp2k::open(dir.path().join("cb3.j2k")).unwrap();
    let codestream = jp2k.codestream(true).unwrap();
    let parameters = codestream.cod().unwrap().coding_style_parameters();
    assert_eq!(parameters.code_block_width(), 64);
    assert_eq!(parameters.code_block_height(), 64);
}

#[test]
fn test_precinct_sizes() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();
    let data = rgb(16, 16);

    let too_small = WriteOptions::new().with_cbsize(64, 64).with_psizes([(64, 64)]);
    assert!(matches!(
        Jp2k::create(dir.path().join("a.j2k")).write(&engine, data.view(), &too_small),
        Err(Error::Configuration(_))
    ));

    let not_power = WriteOptions::new().with_psizes([(96, 128)]);
    assert!(matches!(
        Jp2k::create(dir.path().join("b.j2k")).write(&engine, data.view(), &not_power),
        Err(Error::Configuration(_))
    ));
    assert!(engine.encoded.borrow().is_empty());

    let path = dir.path().join("c.j2k");
    let options = WriteOptions::new()
        .with_cbsize(32, 32)
        .with_psizes([(128, 128), (64, 64)])
        .with_numres(3);
    let mut jp2k = Jp2k::create(&path);
    jp2k.write(&engine, data.view(), &options).unwrap();
    let parameters = engine.last_encoded();
    assert!(parameters.coding_style.contains(CodingStyle::PRECINCTS));
    assert_eq!(parameters.precincts, vec![(128, 128), (64, 64)]);

    let codestream = jp2k.codestream(true).unwrap();
    let cod = codestream.cod().unwrap();
    assert!(cod.coding_style_parameters().has_defined_precinct_size());
    let sizes: Vec<(u32, u32)> = cod
        .coding_style_parameters()
        .precinct_sizes()
        .iter()
        .map(|p| (p.height(), p.width()))
        .collect();
    assert_eq!(sizes, vec![(64, 64), (64, 64), (128, 128)]);
}

#[test]
fn test_cratios_and_psnr_exclusive() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("layers.jp2");
    let engine = MockEngine::new();

    let options = WriteOptions::new().with_cratios([20.0, 5.0, 1.0]).with_psnr([30.0, 35.0, 40.0]);
    let result = Jp2k::create(&path).write(&engine, rgb(8, 8).view(), &options);

    assert!(matches!(result, Err(Error::Configuration(_))));
    assert!(!path.exists());
    assert!(engine.encoded.borrow().is_empty());
}

#[test]
fn test_quality_layers() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();
    let data = rgb(8, 8);

    let mut jp2k = Jp2k::create(dir.path().join("cratios.j2k"));
    jp2k.write(&engine, data.view(), &WriteOptions::new().with_cratios([20.0, 5.0, 1.0]))
        .unwrap();
    assert_eq!(
        engine.last_encoded().layers,
        QualityLayers::Rates(vec![20.0, 5.0, 1.0])
    );
    assert_eq!(jp2k.geometry().unwrap().layers(), 3);

    let mut jp2k = Jp2k::create(dir.path().join("psnr.j2k"));
    jp2k.write(&engine, data.view(), &WriteOptions::new().with_psnr([30.0, 40.0]))
        .unwrap();
    assert_eq!(engine.last_encoded().layers, QualityLayers::Psnr(vec![30.0, 40.0]));
    assert_eq!(jp2k.geometry().unwrap().layers(), 2);

    for options in [
        WriteOptions::new().with_cratios(Vec::new()),
        WriteOptions::new().with_cratios(vec![1.0; 101]),
        WriteOptions::new().with_cratios([-1.0]),
        WriteOptions::new().with_psnr([f32::NAN]),
    ] {
        assert!(matches!(
            options.validate(FileFormat::Jp2, 3),
            Err(Error::Configuration(_))
        ));
    }
}

#[test]
fn test_colorspace() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();

    // No colorspace on a bare codestream
    let result = Jp2k::create(dir.path().join("a.j2k")).write(
        &engine,
        rgb(8, 8).view(),
        &WriteOptions::new().with_colorspace(Colorspace::Srgb),
    );
    assert!(matches!(result, Err(Error::Configuration(_))));

    // RGB needs three components
    let result = Jp2k::create(dir.path().join("b.jp2")).write(
        &engine,
        gray16(8, 8).view(),
        &WriteOptions::new().with_colorspace(Colorspace::Srgb),
    );
    assert!(matches!(result, Err(Error::Configuration(_))));

    let mut jp2k = Jp2k::create(dir.path().join("c.jp2"));
    jp2k.write(&engine, gray16(8, 8).view(), &WriteOptions::new())
        .unwrap();
    let colour = jp2k.file().unwrap().colour_specification().unwrap();
    assert_eq!(
        colour.enumerated_colour_space(),
        Some(ENUMERATED_COLOUR_SPACE_GREYSCALE)
    );

    // Gray is allowed for any number of components
    Jp2k::create(dir.path().join("d.jp2"))
        .write(
            &engine,
            rgb(8, 8).view(),
            &WriteOptions::new().with_colorspace(Colorspace::Gray),
        )
        .unwrap();
    assert_eq!(engine.last_encoded().colorspace, Colorspace::Gray);

    assert_eq!("rgb".parse::<Colorspace>().unwrap(), Colorspace::Srgb);
    assert_eq!("sRGB".parse::<Colorspace>().unwrap(), Colorspace::Srgb);
    assert_eq!("grey".parse::<Colorspace>().unwrap(), Colorspace::Gray);
    assert_eq!("Gray".parse::<Colorspace>().unwrap(), Colorspace::Gray);
    assert!(matches!(
        "cmyk".parse::<Colorspace>(),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_mct_opt_in() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();

    let mut jp2k = Jp2k::create(dir.path().join("plain.j2k"));
    jp2k.write(&engine, rgb(8, 8).view(), &WriteOptions::new()).unwrap();
    assert_eq!(
        jp2k.codestream(true).unwrap().cod().unwrap().multiple_component_transformation(),
        MultipleComponentTransformation::None
    );

    let mut jp2k = Jp2k::create(dir.path().join("mct.j2k"));
    jp2k.write(&engine, rgb(8, 8).view(), &WriteOptions::new().with_mct(true))
        .unwrap();
    assert!(engine.last_encoded().mct);
    assert_eq!(
        jp2k.codestream(true).unwrap().cod().unwrap().multiple_component_transformation(),
        MultipleComponentTransformation::Multiple
    );

    let result = Jp2k::create(dir.path().join("gray.j2k")).write(
        &engine,
        gray16(8, 8).view(),
        &WriteOptions::new().with_mct(true),
    );
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_dimensionality() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();

    let line = Array1::<u8>::zeros(16);
    match Jp2k::create(dir.path().join("a.j2k")).write(&engine, line.view(), &WriteOptions::new()) {
        Err(Error::Configuration(message)) => assert!(message.contains("1D imagery")),
        result => panic!("unexpected result {:?}", result),
    }

    let volume = Array4::<u8>::zeros((2, 2, 2, 2));
    assert!(matches!(
        Jp2k::create(dir.path().join("b.j2k")).write(&engine, volume.view(), &WriteOptions::new()),
        Err(Error::Configuration(_))
    ));

    // Dynamic dimensionality is accepted as long as the rank fits
    let dynamic = rgb(4, 4).into_dyn();
    Jp2k::create(dir.path().join("c.j2k"))
        .write(&engine, dynamic.view(), &WriteOptions::new())
        .unwrap();
    assert_eq!(engine.encoded.borrow().len(), 1);
}

#[test]
fn test_sample_types() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();

    let signed = Array2::<i16>::zeros((4, 4));
    assert!(matches!(
        Jp2k::create(dir.path().join("a.j2k")).write(&engine, signed.view(), &WriteOptions::new()),
        Err(Error::Configuration(_))
    ));

    let empty = Array2::<u8>::zeros((0, 4));
    assert!(matches!(
        Jp2k::create(dir.path().join("b.j2k")).write(&engine, empty.view(), &WriteOptions::new()),
        Err(Error::Configuration(_))
    ));
    assert!(engine.encoded.borrow().is_empty());
}

#[test]
fn test_settings_marshaled() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();
    let data = rgb(32, 48);

    let options = WriteOptions::new()
        .with_numres(3)
        .with_tilesize(16, 16)
        .with_prog(ProgressionOrder::Rpcl)
        .with_sop(true)
        .with_eph(true)
        .with_modesw(0x21)
        .with_verbose(true);
    let mut jp2k = Jp2k::create(dir.path().join("settings.jp2"));
    jp2k.write(&engine, data.view(), &options).unwrap();

    let parameters = engine.last_encoded();
    assert_eq!(parameters.resolutions, Some(3));
    assert_eq!(parameters.tile_size, Some((16, 16)));
    assert_eq!(parameters.progression, ProgressionOrder::Rpcl);
    assert_eq!(parameters.coding_style, CodingStyle::SOP | CodingStyle::EPH);
    assert_eq!(
        parameters.code_block_style,
        CodeBlockStyle::BYPASS | CodeBlockStyle::SEGMENTATION_SYMBOLS
    );
    assert!(parameters.verbose);

    let geometry = jp2k.geometry().unwrap();
    assert_eq!(geometry.decomposition_levels(), 2);
    assert_eq!(geometry.progression_order(), ProgressionOrder::Rpcl);
    assert_eq!(geometry.tile_size(), (16, 16));
    assert_eq!(geometry.num_tiles(), (2, 3));

    let codestream = jp2k.codestream(true).unwrap();
    let cod = codestream.cod().unwrap();
    assert_eq!(cod.coding_styles(), CodingStyle::SOP | CodingStyle::EPH);
    assert_eq!(
        cod.coding_style_parameters().coding_block_styles(),
        CodeBlockStyle::BYPASS | CodeBlockStyle::SEGMENTATION_SYMBOLS
    );

    for options in [
        WriteOptions::new().with_modesw(0x40),
        WriteOptions::new().with_numres(0),
        WriteOptions::new().with_numres(34),
        WriteOptions::new().with_tilesize(0, 16),
        WriteOptions::new().with_subsam(0, 1),
    ] {
        assert!(matches!(
            options.validate(FileFormat::Codestream, 3),
            Err(Error::Configuration(_))
        ));
    }
}

#[test]
fn test_subsampling() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();
    let data = rgb(10, 12);

    let mut jp2k = Jp2k::create(dir.path().join("subsampled.j2k"));
    jp2k.write(&engine, data.view(), &WriteOptions::new().with_subsam(2, 2))
        .unwrap();
    assert_eq!(engine.last_encoded().subsampling, (2, 2));

    let geometry = jp2k.geometry().unwrap();
    assert_eq!(geometry.uniform_subsampling().unwrap(), (2, 2));
    assert_eq!(geometry.component_shape(0, 0), Some((10, 12)));

    let read = jp2k.read(&engine, &ReadOptions::new()).unwrap();
    assert_eq!(read, ImageData::U8(data));
}

#[test]
fn test_reference_grid_overflow() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();
    let data = rgb(8, 8);
    let path = dir.path().join("overflow.j2k");

    for options in [
        WriteOptions::new().with_grid_offset(u32::MAX - 2, 0),
        WriteOptions::new().with_grid_offset(0, u32::MAX - 7),
        WriteOptions::new().with_grid_offset(u32::MAX - 1780, 0).with_subsam(255, 1),
    ] {
        let mut jp2k = Jp2k::create(&path);
        let result = jp2k.write(&engine, data.view(), &options);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
    assert!(engine.encoded.borrow().is_empty());
    assert!(!path.exists());

    // The last sample lands exactly on the grid edge
    let mut jp2k = Jp2k::create(&path);
    jp2k.write(
        &engine,
        data.view(),
        &WriteOptions::new().with_grid_offset(0, u32::MAX - 8),
    )
    .unwrap();
    let geometry = jp2k.geometry().unwrap();
    assert_eq!(geometry.grid_offset(), (0, u32::MAX - 8));
    assert_eq!(geometry.cols(), 8);
}

#[test]
fn test_non_contiguous_input() {
    let dir = tempdir().unwrap();
    let engine = MockEngine::new();

    // Transposed view, not in standard layout
    let data = Array::from_shape_fn((8, 6, 3), |(r, c, k)| (r * 16 + c + k) as u8);
    let transposed = data.view().permuted_axes([1, 0, 2]);
    let mut jp2k = Jp2k::create(dir.path().join("t.j2k"));
    jp2k.write(&engine, transposed, &WriteOptions::new()).unwrap();

    let read = jp2k.read(&engine, &ReadOptions::new()).unwrap();
    let expected = transposed.to_owned();
    assert_eq!(read.as_u8(), Some(&expected));
}
