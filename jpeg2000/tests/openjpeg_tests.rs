#![cfg(feature = "openjpeg")]

use jpeg2000::{Jp2k, OpenJpeg, ReadOptions, Reduce, SampleType, WriteOptions};
use ndarray::{s, Array2, Array3, Axis};
use tempfile::tempdir;

fn rgb(rows: usize, cols: usize) -> Array3<u8> {
    Array3::from_shape_fn((rows, cols, 3), |(r, c, k)| ((r * 7 + c * 3 + k * 85) % 256) as u8)
}

#[test]
fn test_lossless_round_trip() {
    let dir = tempdir().unwrap();
    let data = rgb(64, 96);

    for name in ["rgb.jp2", "rgb.j2k"] {
        let mut jp2k = Jp2k::create(dir.path().join(name));
        jp2k.write(&OpenJpeg, data.view(), &WriteOptions::new()).unwrap();

        let geometry = jp2k.geometry().unwrap();
        assert_eq!((geometry.rows(), geometry.cols()), (64, 96));
        assert_eq!(geometry.num_components(), 3);
        assert_eq!(geometry.layers(), 1);

        let read = jp2k.read(&OpenJpeg, &ReadOptions::new()).unwrap();
        assert_eq!(read.as_u8(), Some(&data));
    }
}

#[test]
fn test_sixteen_bit() {
    let dir = tempdir().unwrap();
    let data = Array2::from_shape_fn((32, 40), |(r, c)| (r * 1000 + c * 17) as u16);

    let mut jp2k = Jp2k::create(dir.path().join("gray.jp2"));
    jp2k.write(&OpenJpeg, data.view(), &WriteOptions::new()).unwrap();

    let read = jp2k.read(&OpenJpeg, &ReadOptions::new()).unwrap();
    assert_eq!(read.sample_type(), SampleType::U16);
    assert_eq!(read.as_u16(), Some(&data.insert_axis(Axis(2))));
}

#[test]
fn test_reduce_and_area() {
    let dir = tempdir().unwrap();
    let data = rgb(64, 96);
    let mut jp2k = Jp2k::create(dir.path().join("reduce.jp2"));
    jp2k.write(&OpenJpeg, data.view(), &WriteOptions::new().with_numres(4))
        .unwrap();

    let half = jp2k
        .read(&OpenJpeg, &ReadOptions::new().with_reduce(Reduce::Level(1)))
        .unwrap();
    assert_eq!(half.shape(), (32, 48, 3));

    let thumbnail = jp2k
        .read(&OpenJpeg, &ReadOptions::new().with_reduce(Reduce::Thumbnail))
        .unwrap();
    assert_eq!(thumbnail.shape(), (8, 12, 3));

    let area = jp2k
        .read(&OpenJpeg, &ReadOptions::new().with_area((8, 16, 40, 80)))
        .unwrap();
    assert_eq!(area.as_u8(), Some(&data.slice(s![8..40, 16..80, ..]).to_owned()));
}

#[test]
fn test_tile() {
    let dir = tempdir().unwrap();
    let data = rgb(64, 64);
    let mut jp2k = Jp2k::create(dir.path().join("tiled.j2k"));
    jp2k.write(&OpenJpeg, data.view(), &WriteOptions::new().with_tilesize(32, 32))
        .unwrap();
    assert_eq!(jp2k.geometry().unwrap().num_tiles(), (2, 2));

    let tile = jp2k.read(&OpenJpeg, &ReadOptions::new().with_tile(3)).unwrap();
    assert_eq!(tile.as_u8(), Some(&data.slice(s![32..64, 32..64, ..]).to_owned()));
}

#[test]
fn test_irreversible_layers() {
    let dir = tempdir().unwrap();
    let data = rgb(64, 64);
    let mut jp2k = Jp2k::create(dir.path().join("lossy.jp2"));
    jp2k.write(
        &OpenJpeg,
        data.view(),
        &WriteOptions::new().with_cratios([40.0, 20.0, 1.0]),
    )
    .unwrap();
    assert_eq!(jp2k.geometry().unwrap().layers(), 3);

    let first = jp2k.read(&OpenJpeg, &ReadOptions::new().with_layer(1)).unwrap();
    assert_eq!(first.shape(), (64, 64, 3));
}
