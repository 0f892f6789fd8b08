//! GeoTIFF reading and writing.
//!
//! Georeferencing is taken from the ModelPixelScale + ModelTiepoint pair
//! (or a north-up ModelTransformation) and the CRS from the GeoKey
//! directory. Only EPSG:4326 and WGS84 / UTM are recognized. Samples may be
//! pixel-interleaved or stored band by band, in strips or tiles.

use super::types::{Crs, GeoTransform, Raster, RasterDataType, RasterError, EPSG_WGS84};
use ndarray::Array3;
use std::fs;
use std::io::{BufReader, Cursor, Read, Seek};
use std::ops::Range;
use std::path::Path;
use tiff::decoder::{ChunkType, Decoder, DecodingResult, Limits};
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_NODATA: u16 = 42113;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;

const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_INT: u16 = 2;
const SAMPLE_FORMAT_FLOAT: u16 = 3;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const RASTER_PIXEL_IS_POINT: u16 = 2;

fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Reads a GeoTIFF file.
pub fn read_geotiff(path: &Path) -> Result<Raster, RasterError> {
    let file = fs::File::open(path)?;
    decode(BufReader::new(file))
}

/// Decodes a GeoTIFF from memory.
pub fn decode_geotiff(bytes: &[u8]) -> Result<Raster, RasterError> {
    decode(Cursor::new(bytes))
}

/// Whether the bytes start with a TIFF or BigTIFF signature.
pub fn looks_like_tiff(bytes: &[u8]) -> bool {
    matches!(
        bytes.get(..4),
        Some([b'I', b'I', 42, 0]) | Some([b'M', b'M', 0, 42]) | Some([b'I', b'I', 43, 0]) | Some([b'M', b'M', 0, 43])
    )
}

fn decode<R: Read + Seek>(reader: R) -> Result<Raster, RasterError> {
    let mut decoder = Decoder::new(reader)?.with_limits(Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);
    let samples = optional_u32(&mut decoder, Tag::SamplesPerPixel)?.unwrap_or(1) as usize;
    let planar = optional_u32(&mut decoder, Tag::PlanarConfiguration)?.unwrap_or(1) == 2;

    let geokeys = match decoder.find_tag(geo_tag(TAG_GEO_KEY_DIRECTORY))? {
        Some(value) => parse_geokeys(&value.into_u16_vec()?),
        None => Vec::new(),
    };
    let crs = crs_from_geokeys(&geokeys)?;
    let mut transform = read_transform(&mut decoder)?;
    if geokey(&geokeys, KEY_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        transform.origin_x -= transform.pixel_width / 2.0;
        transform.origin_y += transform.pixel_height / 2.0;
    }

    let nodata = match decoder.find_tag(geo_tag(TAG_GDAL_NODATA))? {
        Some(value) => value
            .into_string()
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse::<f64>().ok()),
        None => None,
    };

    let encoding = SampleEncoding::read(&mut decoder)?;
    let data_type = encoding.data_type()?;
    let data = read_bands(&mut decoder, encoding, samples, height, width, planar)?;

    Ok(Raster {
        data,
        transform,
        crs,
        data_type,
        nodata,
    })
}

/// Sample format and bit depth shared by every band.
#[derive(Debug, Clone, Copy)]
struct SampleEncoding {
    format: u16,
    bits: u16,
}

impl SampleEncoding {
    fn read<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Self, RasterError> {
        let bits = match decoder.find_tag(Tag::BitsPerSample)? {
            Some(value) => value.into_u16_vec()?.first().copied().unwrap_or(1),
            None => 1,
        };
        let format = match decoder.find_tag(Tag::SampleFormat)? {
            Some(value) => value.into_u16_vec()?.first().copied().unwrap_or(SAMPLE_FORMAT_UINT),
            None => SAMPLE_FORMAT_UINT,
        };
        Ok(Self { format, bits })
    }

    fn data_type(self) -> Result<RasterDataType, RasterError> {
        Ok(match (self.format, self.bits) {
            (SAMPLE_FORMAT_FLOAT, 32) => RasterDataType::F32,
            (SAMPLE_FORMAT_FLOAT, 64) => RasterDataType::F64,
            (SAMPLE_FORMAT_INT, 1..=8) => RasterDataType::I8,
            (SAMPLE_FORMAT_INT, 9..=16) => RasterDataType::I16,
            (SAMPLE_FORMAT_INT, 17..=32) => RasterDataType::I32,
            (SAMPLE_FORMAT_UINT, 1..=8) => RasterDataType::U8,
            (SAMPLE_FORMAT_UINT, 9..=16) => RasterDataType::U16,
            (SAMPLE_FORMAT_UINT, 17..=32) => RasterDataType::U32,
            (format, bits) => {
                return Err(RasterError::UnsupportedLayout(format!(
                    "{}-bit samples of sample format {}",
                    bits, format
                )))
            }
        })
    }

    /// Reads one uncompressed sample at the decoder's current offset.
    fn read_sample<R: Read + Seek>(self, decoder: &mut Decoder<R>) -> Result<f32, RasterError> {
        Ok(match (self.format, self.bits) {
            (SAMPLE_FORMAT_FLOAT, 32) => decoder.read_float()?,
            (SAMPLE_FORMAT_FLOAT, 64) => decoder.read_double()? as f32,
            (SAMPLE_FORMAT_INT, 8) => decoder.read_byte()? as i8 as f32,
            (SAMPLE_FORMAT_INT, 16) => decoder.read_sshort()? as f32,
            (SAMPLE_FORMAT_INT, 32) => decoder.read_slong()? as f32,
            (SAMPLE_FORMAT_UINT, 8) => decoder.read_byte()? as f32,
            (SAMPLE_FORMAT_UINT, 16) => decoder.read_short()? as f32,
            (SAMPLE_FORMAT_UINT, 32) => decoder.read_long()? as f32,
            (format, bits) => {
                return Err(RasterError::UnsupportedLayout(format!(
                    "uncompressed {}-bit samples of sample format {}",
                    bits, format
                )))
            }
        })
    }
}

fn decoded_to_f32(result: DecodingResult) -> Result<Vec<f32>, RasterError> {
    Ok(match result {
        DecodingResult::U8(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U16(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::U32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I8(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I16(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::I32(v) => v.into_iter().map(|s| s as f32).collect(),
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|s| s as f32).collect(),
        _ => {
            return Err(RasterError::UnsupportedLayout(
                "64-bit integer samples".to_string(),
            ))
        }
    })
}

/// Decodes every strip or tile into a band-major array.
///
/// Pixel-interleaved and band-separate (`PlanarConfiguration=2`) files are
/// both accepted. In the band-separate layout chunk indices run band by band.
/// Sample layouts the tiff crate cannot expand itself (grayscale with more
/// than one sample) are read directly and must be uncompressed.
fn read_bands<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    encoding: SampleEncoding,
    samples: usize,
    height: usize,
    width: usize,
    planar: bool,
) -> Result<Array3<f32>, RasterError> {
    let mut data = Array3::<f32>::zeros((samples, height, width));
    if samples == 0 || height == 0 || width == 0 {
        return Ok(data);
    }

    let chunk_type = decoder.get_chunk_type();
    let (chunk_width, chunk_height) = decoder.chunk_dimensions();
    let (chunk_width, chunk_height) = (chunk_width as usize, chunk_height as usize);
    if chunk_width == 0 || chunk_height == 0 {
        return Err(RasterError::Shape(format!(
            "empty {}x{} chunks",
            chunk_width, chunk_height
        )));
    }
    let across = match chunk_type {
        ChunkType::Strip => 1,
        ChunkType::Tile => width.div_ceil(chunk_width),
    };
    let per_band = across * height.div_ceil(chunk_height);
    let (stored_bands, chunk_samples) = if planar { (samples, 1) } else { (1, samples) };

    // Offsets are only needed when the tiff crate cannot expand the chunks
    let raw_offsets = match decoder.colortype() {
        Ok(_) => None,
        Err(_) => {
            if optional_u32(decoder, Tag::Compression)?.unwrap_or(1) != 1 {
                return Err(RasterError::UnsupportedLayout(format!(
                    "compressed {}-band grayscale",
                    samples
                )));
            }
            let tag = match chunk_type {
                ChunkType::Strip => Tag::StripOffsets,
                ChunkType::Tile => Tag::TileOffsets,
            };
            let offsets = decoder
                .find_tag_unsigned_vec::<u64>(tag)?
                .ok_or_else(|| RasterError::Shape("missing chunk offsets".to_string()))?;
            Some(offsets)
        }
    };

    for index in 0..per_band * stored_bands {
        let band = if planar { index / per_band } else { 0 };
        let local = index % per_band;
        let row0 = (local / across) * chunk_height;
        let col0 = (local % across) * chunk_width;
        let rows = chunk_height.min(height - row0);
        let cols = chunk_width.min(width - col0);

        let (values, stride) = match &raw_offsets {
            None => {
                let stride = decoder.chunk_data_dimensions(index as u32).0 as usize;
                (decoded_to_f32(decoder.read_chunk(index as u32)?)?, stride)
            }
            Some(offsets) => {
                let offset = offsets.get(index).copied().ok_or_else(|| {
                    RasterError::Shape(format!(
                        "{} chunk offsets for {} chunks",
                        offsets.len(),
                        per_band * stored_bands
                    ))
                })?;
                decoder.goto_offset_u64(offset)?;
                let count = rows * chunk_width * chunk_samples;
                let values = (0..count)
                    .map(|_| encoding.read_sample(decoder))
                    .collect::<Result<Vec<f32>, _>>()?;
                (values, chunk_width)
            }
        };

        if stride < cols || values.len() < rows * stride * chunk_samples {
            return Err(RasterError::Shape(format!(
                "chunk {} decoded {} samples for {}x{}x{}",
                index,
                values.len(),
                chunk_samples,
                rows,
                cols
            )));
        }
        for r in 0..rows {
            for c in 0..cols {
                let base = (r * stride + c) * chunk_samples;
                for s in 0..chunk_samples {
                    data[(band + s, row0 + r, col0 + c)] = values[base + s];
                }
            }
        }
    }

    Ok(data)
}

fn optional_u32<R: Read + Seek>(
    decoder: &mut Decoder<R>,
    tag: Tag,
) -> Result<Option<u32>, RasterError> {
    match decoder.find_tag(tag)? {
        Some(value) => Ok(Some(value.into_u32()?)),
        None => Ok(None),
    }
}

fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<GeoTransform, RasterError> {
    if let Some(matrix) = decoder.find_tag(geo_tag(TAG_MODEL_TRANSFORMATION))? {
        let m = matrix.into_f64_vec()?;
        if m.len() < 8 {
            return Err(RasterError::MissingGeoreference(
                "ModelTransformation has fewer than 8 values".to_string(),
            ));
        }
        if m[1] != 0.0 || m[4] != 0.0 {
            return Err(RasterError::UnsupportedLayout(
                "rotated model transformation".to_string(),
            ));
        }
        return Ok(GeoTransform {
            origin_x: m[3],
            origin_y: m[7],
            pixel_width: m[0],
            pixel_height: -m[5],
        });
    }

    let scale = decoder
        .find_tag(geo_tag(TAG_MODEL_PIXEL_SCALE))?
        .ok_or_else(|| RasterError::MissingGeoreference("ModelPixelScale".to_string()))?
        .into_f64_vec()?;
    let tiepoint = decoder
        .find_tag(geo_tag(TAG_MODEL_TIEPOINT))?
        .ok_or_else(|| RasterError::MissingGeoreference("ModelTiepoint".to_string()))?
        .into_f64_vec()?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(RasterError::MissingGeoreference(
            "truncated pixel scale or tiepoint".to_string(),
        ));
    }

    let (pixel_width, pixel_height) = (scale[0], scale[1]);
    let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
    Ok(GeoTransform {
        origin_x: x - i * pixel_width,
        origin_y: y + j * pixel_height,
        pixel_width,
        pixel_height,
    })
}

/// `(key, value)` pairs of the GeoKey directory with inline short values.
fn parse_geokeys(raw: &[u16]) -> Vec<(u16, u16)> {
    if raw.len() < 4 {
        return Vec::new();
    }
    let count = raw[3] as usize;
    raw[4..]
        .chunks_exact(4)
        .take(count)
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

fn geokey(keys: &[(u16, u16)], key: u16) -> Option<u16> {
    keys.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn crs_from_geokeys(keys: &[(u16, u16)]) -> Result<Crs, RasterError> {
    if let Some(code) = geokey(keys, KEY_PROJECTED_CS_TYPE) {
        return Crs::from_epsg(code as u32);
    }
    match (geokey(keys, KEY_GEOGRAPHIC_TYPE), geokey(keys, KEY_MODEL_TYPE)) {
        (Some(code), _) if code as u32 == EPSG_WGS84 => Ok(Crs::Geographic),
        (Some(code), _) => Err(RasterError::UnsupportedCrs(format!("EPSG:{}", code))),
        (None, Some(MODEL_TYPE_GEOGRAPHIC)) => Ok(Crs::Geographic),
        _ => Err(RasterError::MissingGeoreference(
            "GeoKey directory has no EPSG code".to_string(),
        )),
    }
}

/// Encodes a raster as an uncompressed, single-strip GeoTIFF.
///
/// Floating-point sources are written as `f32`, integer sources as `i32`.
pub fn encode_geotiff(raster: &Raster) -> Result<Vec<u8>, RasterError> {
    encode_strips(raster, false, raster.data.dim().1)
}

/// Encodes with `rows_per_strip` rows per strip, either pixel-interleaved or
/// one strip set per band when `planar` is set.
fn encode_strips(raster: &Raster, planar: bool, rows_per_strip: usize) -> Result<Vec<u8>, RasterError> {
    let (bands, height, width) = raster.data.dim();
    if bands == 0 || height == 0 || width == 0 {
        return Err(RasterError::Shape(format!(
            "cannot encode empty raster {}x{}x{}",
            bands, height, width
        )));
    }

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer)?;
        let mut dir = encoder.new_directory()?;

        let integer = raster.data_type.is_integer();
        let rows_per_strip = rows_per_strip.clamp(1, height);
        let band_groups: Vec<Range<usize>> = if planar {
            (0..bands).map(|b| b..b + 1).collect()
        } else {
            vec![0..bands]
        };

        let mut offsets = Vec::new();
        let mut byte_counts = Vec::new();
        for group in &band_groups {
            for row0 in (0..height).step_by(rows_per_strip) {
                let rows = row0..(row0 + rows_per_strip).min(height);
                let values = rows
                    .flat_map(|r| (0..width).flat_map(move |c| group.clone().map(move |b| (b, r, c))))
                    .map(|idx| raster.data[idx]);
                let (offset, byte_count) = if integer {
                    let strip: Vec<i32> = values.map(|v| v.round() as i32).collect();
                    (dir.write_data(&strip[..])?, strip.len() * 4)
                } else {
                    let strip: Vec<f32> = values.collect();
                    (dir.write_data(&strip[..])?, strip.len() * 4)
                };
                offsets.push(offset as u32);
                byte_counts.push(byte_count as u32);
            }
        }

        let bits = vec![32u16; bands];
        let sample_format = vec![if integer { 2u16 } else { 3u16 }; bands];

        dir.write_tag(Tag::ImageWidth, width as u32)?;
        dir.write_tag(Tag::ImageLength, height as u32)?;
        dir.write_tag(Tag::BitsPerSample, &bits[..])?;
        dir.write_tag(Tag::Compression, 1u16)?;
        dir.write_tag(Tag::PhotometricInterpretation, 1u16)?;
        dir.write_tag(Tag::StripOffsets, &offsets[..])?;
        dir.write_tag(Tag::SamplesPerPixel, bands as u16)?;
        dir.write_tag(Tag::RowsPerStrip, rows_per_strip as u32)?;
        dir.write_tag(Tag::StripByteCounts, &byte_counts[..])?;
        dir.write_tag(Tag::PlanarConfiguration, if planar { 2u16 } else { 1u16 })?;
        dir.write_tag(Tag::SampleFormat, &sample_format[..])?;
        if bands > 1 {
            let extra = vec![0u16; bands - 1];
            dir.write_tag(Tag::ExtraSamples, &extra[..])?;
        }

        let t = &raster.transform;
        let scale = [t.pixel_width, t.pixel_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
        dir.write_tag(geo_tag(TAG_MODEL_PIXEL_SCALE), &scale[..])?;
        dir.write_tag(geo_tag(TAG_MODEL_TIEPOINT), &tiepoint[..])?;

        let geokeys: Vec<u16> = match raster.crs {
            Crs::Utm(zone) => vec![
                1, 1, 0, 3,
                KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_PROJECTED,
                KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
                KEY_PROJECTED_CS_TYPE, 0, 1, zone.epsg() as u16,
            ],
            Crs::Geographic => vec![
                1, 1, 0, 3,
                KEY_MODEL_TYPE, 0, 1, MODEL_TYPE_GEOGRAPHIC,
                KEY_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
                KEY_GEOGRAPHIC_TYPE, 0, 1, EPSG_WGS84 as u16,
            ],
        };
        dir.write_tag(geo_tag(TAG_GEO_KEY_DIRECTORY), &geokeys[..])?;

        if let Some(nodata) = raster.nodata {
            let text = nodata.to_string();
            dir.write_tag(geo_tag(TAG_GDAL_NODATA), text.as_str())?;
        }

        dir.finish()?;
    }

    Ok(buffer.into_inner())
}

/// Writes a raster to `path` as a GeoTIFF.
pub fn write_geotiff(path: &Path, raster: &Raster) -> Result<(), RasterError> {
    let bytes = encode_geotiff(raster)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}
