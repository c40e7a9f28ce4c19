//! Sampling of NDVI values from a north-up GeoTIFF raster in EPSG:4326

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tracing::{debug, info};

/// Used when the raster doesn't declare a nodata value
pub const DEFAULT_NODATA: f64 = -9999.0;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("unable to open raster: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to decode raster: {0}")]
    Tiff(#[from] tiff::TiffError),
    #[error("raster has no usable georeferencing: {0}")]
    MissingTransform(&'static str),
    #[error("raster holds {actual} samples, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Affine transform for a north-up raster, mapping pixel (col, row) to the
/// coordinates of the pixel's top left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Build the transform from the GeoTIFF ModelPixelScale & ModelTiepoint
    /// tags. The tiepoint ties raster point (I, J) to model point (X, Y)
    pub fn from_tags(scale: &[f64], tiepoint: &[f64]) -> Result<Self, RasterError> {
        let [sx, sy, ..] = scale else {
            return Err(RasterError::MissingTransform("pixel scale"));
        };
        let [i, j, _, x, y, ..] = tiepoint else {
            return Err(RasterError::MissingTransform("tiepoint"));
        };
        if *sx == 0.0 || *sy == 0.0 {
            return Err(RasterError::MissingTransform("zero pixel size"));
        }
        Ok(GeoTransform {
            origin_x: x - i * sx,
            origin_y: y + j * sy,
            pixel_width: *sx,
            pixel_height: *sy,
        })
    }

    /// Apply the inverse transform, giving fractional (col, row)
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.origin_x) / self.pixel_width;
        let row = (self.origin_y - y) / self.pixel_height;
        (col, row)
    }
}

/// Band 1 of an NDVI raster, held in memory
#[derive(Debug, Clone)]
pub struct NdviRaster {
    width: usize,
    height: usize,
    data: Vec<f64>,
    transform: GeoTransform,
    nodata: f64,
}

/// Widen whatever sample type the raster uses to f64, keeping only the
/// first sample of each pixel
fn band_one(result: DecodingResult, samples: usize) -> Vec<f64> {
    fn take<T: Copy + Into<f64>>(values: Vec<T>, step: usize) -> Vec<f64> {
        values.into_iter().step_by(step).map(Into::into).collect()
    }
    let step = samples.max(1);
    match result {
        DecodingResult::U8(values) => take(values, step),
        DecodingResult::U16(values) => take(values, step),
        DecodingResult::U32(values) => take(values, step),
        DecodingResult::I8(values) => take(values, step),
        DecodingResult::I16(values) => take(values, step),
        DecodingResult::I32(values) => take(values, step),
        DecodingResult::F32(values) => take(values, step),
        DecodingResult::F64(values) => take(values, step),
        DecodingResult::U64(values) => {
            values.into_iter().step_by(step).map(|v| v as f64).collect()
        }
        DecodingResult::I64(values) => {
            values.into_iter().step_by(step).map(|v| v as f64).collect()
        }
    }
}

impl NdviRaster {
    pub fn new(
        width: usize,
        height: usize,
        data: Vec<f64>,
        transform: GeoTransform,
        nodata: f64,
    ) -> Result<Self, RasterError> {
        if data.len() != width * height {
            return Err(RasterError::SizeMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(NdviRaster {
            width,
            height,
            data,
            transform,
            nodata,
        })
    }

    /// Read band 1 and the georeferencing of a GeoTIFF
    pub fn open(path: &Path) -> Result<Self, RasterError> {
        info!("Reading NDVI raster from {}", path.display());
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?;

        let (width, height) = decoder.dimensions()?;
        let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag)?;
        let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag)?;
        let transform = GeoTransform::from_tags(&scale, &tiepoint)?;

        // GDAL stores nodata as an ASCII string
        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|value| value.trim_matches(char::from(0)).trim().parse::<f64>().ok())
            .unwrap_or(DEFAULT_NODATA);
        let samples = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;

        let data = band_one(decoder.read_image()?, samples);
        debug!("Raster is {width}x{height}, nodata {nodata}, {transform:?}");

        NdviRaster::new(width as usize, height as usize, data, transform, nodata)
    }

    /// NDVI at a (lon, lat) location. None if the location falls outside
    /// the raster, or if the pixel holds nodata or NaN
    pub fn sample(&self, lon: f64, lat: f64) -> Option<f64> {
        let (col, row) = self.transform.to_pixel(lon, lat);
        let (col, row) = (col.floor(), row.floor());
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.width || row >= self.height {
            return None;
        }

        let value = self.data[row * self.width + col];
        if value.is_nan() || value == self.nodata {
            None
        } else {
            Some(value)
        }
    }
}
