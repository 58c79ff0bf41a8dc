mod common;

use common::*;
use ndarray::Array2;
use ocm2::core::{
    CloudMaskEngine, ExtractedScene, Georeferencer, RadiometricConverter, ReflectanceSet,
    SubdatasetExtractor,
};
use ocm2::io::{read_band, read_gcps, read_profile, write_raster};
use ocm2::{BandIndex, CancellationToken, GeoTransform, OcmError, RasterProfile, Subdataset};
use std::fs;
use tempfile::TempDir;

fn band(n: u8) -> BandIndex {
    BandIndex::new(n).unwrap()
}

#[test]
fn test_extraction_names_bands_by_position() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let scene = build_scene(&tmp.path().join("source"), 8);
    let out = tmp.path().join("GeoTiff");

    let extracted = SubdatasetExtractor::default()
        .extract(&scene, &out, &CancellationToken::new())
        .unwrap();

    assert_eq!(extracted.bands.len(), 8);
    for (i, artifact) in extracted.bands.iter().enumerate() {
        assert_eq!(artifact.index.number() as usize, i + 1);
        assert_eq!(artifact.path, out.join(format!("band{}.TIF", i + 1)));
    }

    let band3 = read_band(&extracted.band(band(3)).unwrap().path).unwrap();
    assert_eq!(band3.profile.nodata, Some(-32768.0));
    assert_eq!(band3.data, band_radiance(3).mapv(|v| v as f64));
}

#[test]
fn test_extraction_stamps_placeholder_grid_on_bare_subdataset() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let scene = build_scene(&tmp.path().join("source"), 1);

    let extracted = SubdatasetExtractor::default()
        .extract(&scene, &tmp.path().join("GeoTiff"), &CancellationToken::new())
        .unwrap();
    let written = read_profile(&extracted.bands[0].path).unwrap();

    assert_eq!(written.transform, GeoTransform::placeholder());
    assert_eq!((written.width, written.height), (WIDTH, HEIGHT));
    assert!(written.projection.is_empty());
}

#[test]
fn test_extraction_keeps_source_georeferencing() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let source = tmp.path().join("projected.tif");

    let wkt = gdal::spatial_ref::SpatialRef::from_epsg(32644).unwrap().to_wkt().unwrap();
    let profile = RasterProfile {
        width: 3,
        height: 2,
        transform: GeoTransform {
            top_left_x: 500000.0,
            pixel_width: 360.0,
            rotation_x: 0.0,
            top_left_y: 2400000.0,
            rotation_y: 0.0,
            pixel_height: -360.0,
        },
        projection: wkt,
        nodata: None,
    };
    let data = Array2::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as f32);
    write_raster(&source, &data, &profile, None).unwrap();

    let mut scene = build_scene(&tmp.path().join("source"), 0);
    scene.subdatasets = vec![Subdataset {
        name: source.to_string_lossy().into_owned(),
        description: "[2x3] B1".to_string(),
    }];

    let extracted = SubdatasetExtractor::default()
        .extract(&scene, &tmp.path().join("GeoTiff"), &CancellationToken::new())
        .unwrap();
    let written = read_profile(&extracted.bands[0].path).unwrap();

    assert_eq!(written.transform, profile.transform);
    assert!(written.projection.contains("UTM"));
    assert_eq!(written.nodata, Some(-32768.0));
}

#[test]
fn test_rerun_extraction_replaces_folder_contents() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("GeoTiff");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("stale.TIF"), b"old run").unwrap();

    let scene = build_scene(&tmp.path().join("source"), 2);
    SubdatasetExtractor::default()
        .extract(&scene, &out, &CancellationToken::new())
        .unwrap();

    assert!(!out.join("stale.TIF").exists());
    let reopened = ExtractedScene::from_dir(&out).unwrap();
    assert_eq!(reopened.bands.len(), 2);
}

#[test]
fn test_conversion_copies_pass_through_band() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let scene = build_scene(&tmp.path().join("source"), 8);
    let cancel = CancellationToken::new();

    let extracted = SubdatasetExtractor::default()
        .extract(&scene, &tmp.path().join("GeoTiff"), &cancel)
        .unwrap();
    let reflectance = RadiometricConverter::default()
        .convert(&extracted, SUN_ELEVATION, &tmp.path().join("Reflectance"), &cancel)
        .unwrap();

    assert_eq!(reflectance.bands.len(), 8);
    assert_eq!(
        fs::read(&reflectance.band(band(8)).unwrap().path).unwrap(),
        fs::read(&extracted.band(band(8)).unwrap().path).unwrap()
    );

    let radiance = read_band(&extracted.band(band(1)).unwrap().path).unwrap();
    let toa = read_band(&reflectance.band(band(1)).unwrap().path).unwrap();
    assert_eq!(toa.profile, radiance.profile);
    approx::assert_relative_eq!(toa.data[[0, 0]], 0.6, epsilon = 1e-5);
    approx::assert_relative_eq!(toa.data[[0, WIDTH - 1]], 0.1, epsilon = 1e-5);

    let reopened = ReflectanceSet::from_dir(&reflectance.dir).unwrap();
    assert_eq!(reopened.bands.len(), 8);
}

#[test]
fn test_conversion_rejects_horizon_sun_before_writing() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let scene = build_scene(&tmp.path().join("source"), 2);
    let cancel = CancellationToken::new();
    let extracted = SubdatasetExtractor::default()
        .extract(&scene, &tmp.path().join("GeoTiff"), &cancel)
        .unwrap();

    let out = tmp.path().join("Reflectance");
    let result = RadiometricConverter::default().convert(&extracted, 0.0, &out, &cancel);

    assert!(matches!(result, Err(OcmError::NumericDomain(_))));
    assert!(!out.exists());
}

#[test]
fn test_cloud_mask_needs_seven_bands() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let scene = build_scene(&tmp.path().join("source"), 6);
    let cancel = CancellationToken::new();
    let extracted = SubdatasetExtractor::default()
        .extract(&scene, &tmp.path().join("GeoTiff"), &cancel)
        .unwrap();
    let reflectance = RadiometricConverter::default()
        .convert(&extracted, SUN_ELEVATION, &tmp.path().join("Reflectance"), &cancel)
        .unwrap();

    match CloudMaskEngine::default().run(&reflectance, &reflectance.dir, None) {
        Err(OcmError::IncompleteBandSet { missing }) => assert_eq!(missing, vec![7]),
        other => panic!("expected IncompleteBandSet, got {:?}", other),
    }
    assert!(!reflectance.dir.join("cloud_mask.TIF").exists());
}

#[test]
fn test_georeferencer_leaves_source_untouched() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let scene = build_scene(&tmp.path().join("source"), 3);
    let extracted = SubdatasetExtractor::default()
        .extract(&scene, &tmp.path().join("GeoTiff"), &CancellationToken::new())
        .unwrap();
    let input = extracted.band(band(3)).unwrap().path.clone();
    let before = fs::read(&input).unwrap();

    let metadata = ocm2::core::MetadataResolver::resolve(&scene).unwrap();
    let georeferencer = Georeferencer::new("_georef", false).unwrap();
    let out_dir = tmp.path().join("GeoTiff_ref");
    fs::create_dir_all(&out_dir).unwrap();

    let output = georeferencer.georeference(&input, &metadata, &out_dir).unwrap();

    assert_eq!(output, out_dir.join("band3_georef.TIF"));
    assert_eq!(fs::read(&input).unwrap(), before);
    assert!(read_gcps(&input).unwrap().0.is_empty());
    assert_eq!(read_gcps(&output).unwrap().0.len(), 4);
    assert_eq!(read_band(&output).unwrap().data, read_band(&input).unwrap().data);
}

#[test]
fn test_georeferencer_rejects_raster_without_transform() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let stage_dir = tmp.path().join("GeoTiff");
    fs::create_dir_all(&stage_dir).unwrap();
    write_bare_raster(&stage_dir.join("band1.tif"), &band_radiance(1));

    let reopened = ExtractedScene::from_dir(&stage_dir).unwrap();
    let inputs: Vec<_> = reopened.bands.iter().map(|b| b.path.clone()).collect();

    let scene = build_scene(&tmp.path().join("source"), 0);
    let metadata = ocm2::core::MetadataResolver::resolve(&scene).unwrap();
    let out_dir = tmp.path().join("GeoTiff_ref");
    let result = Georeferencer::new("_georef", false).unwrap().georeference_all(
        &inputs,
        &metadata,
        &out_dir,
        &CancellationToken::new(),
    );

    assert!(matches!(result, Err(OcmError::DegenerateTransform(_))));
    assert!(!out_dir.join("band1_georef.TIF").exists());
}

#[test]
fn test_georeferencer_reports_unreadable_input() {
    init_logging();
    let tmp = TempDir::new().unwrap();
    let bogus = tmp.path().join("band1.TIF");
    fs::write(&bogus, b"not a raster").unwrap();

    let scene = build_scene(&tmp.path().join("source"), 0);
    let metadata = ocm2::core::MetadataResolver::resolve(&scene).unwrap();
    let result = Georeferencer::new("_georef", false)
        .unwrap()
        .georeference(&bogus, &metadata, tmp.path());

    assert!(matches!(result, Err(OcmError::Gdal(_))));
}
