//! EXIF extraction and evidence-photo recompression.
//!
//! Everything in here is best-effort: a photo that cannot be parsed yields
//! empty metadata and a photo that cannot be recompressed is stored as-is.
//! Callers never see an error from this module.

use std::io::Cursor;

use chrono::{DateTime, NaiveDateTime, Utc};
use exif::{In, Tag, Value};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageDecoder, ImageReader, Rgb, RgbImage, imageops::FilterType};

/// Metadata recovered from an uploaded photo's EXIF block.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExifMetadata {
    pub captured_at: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Extract `DateTimeOriginal` and GPS coordinates from image bytes.
///
/// Missing or malformed EXIF yields default (all-`None`) metadata.
pub fn extract_exif_metadata(bytes: &[u8]) -> ExifMetadata {
    read_exif(bytes).unwrap_or_default()
}

fn read_exif(bytes: &[u8]) -> Option<ExifMetadata> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;

    let captured_at = exif
        .get_field(Tag::DateTimeOriginal, In::PRIMARY)
        .and_then(|field| ascii_value(&field.value))
        .and_then(parse_exif_datetime);

    let latitude = gps_coordinate(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef);
    let longitude = gps_coordinate(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef);

    // A device without a fix writes (0, 0); treat the pair as absent.
    let (latitude, longitude) = match (latitude, longitude) {
        (Some(lat), Some(lon)) => match normalize_gps(lat, lon) {
            Some((lat, lon)) => (Some(lat), Some(lon)),
            None => (None, None),
        },
        _ => (None, None),
    };

    Some(ExifMetadata {
        captured_at,
        latitude,
        longitude,
    })
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(lines) => lines
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Parse the EXIF timestamp format, e.g. "2024:01:15 14:30:45".
/// EXIF carries no timezone; capture times are taken as UTC.
pub(crate) fn parse_exif_datetime(raw: String) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn gps_coordinate(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag) -> Option<f64> {
    let dms = match &exif.get_field(value_tag, In::PRIMARY)?.value {
        Value::Rational(parts) => parts
            .iter()
            .map(|r| {
                if r.denom == 0 {
                    None
                } else {
                    Some(r.to_f64())
                }
            })
            .collect::<Option<Vec<f64>>>()?,
        _ => return None,
    };

    let reference = ascii_value(&exif.get_field(ref_tag, In::PRIMARY)?.value)?;

    dms_to_decimal(&dms, reference.trim())
}

/// Convert GPS degrees/minutes/seconds to signed decimal degrees.
/// South and West references negate the result.
pub(crate) fn dms_to_decimal(dms: &[f64], reference: &str) -> Option<f64> {
    let degrees = *dms.first()?;
    let minutes = dms.get(1).copied().unwrap_or(0.0);
    let seconds = dms.get(2).copied().unwrap_or(0.0);

    let decimal = degrees + minutes / 60.0 + seconds / 3600.0;

    match reference {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// Reject the (0, 0) "null island" pair and out-of-range coordinates.
pub(crate) fn normalize_gps(latitude: f64, longitude: f64) -> Option<(f64, f64)> {
    if latitude == 0.0 && longitude == 0.0 {
        return None;
    }
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return None;
    }
    Some((latitude, longitude))
}

/// Recompress an uploaded photo for storage.
///
/// Applies the EXIF orientation, flattens transparency onto white, scales the
/// longest edge down to `max_dimension`, and re-encodes as JPEG at `quality`.
/// Re-encoding drops the EXIF block from the stored copy. Returns `None` on
/// any decode/encode failure so the caller can keep the original bytes.
pub fn compress_photo(bytes: &[u8], max_dimension: u32, quality: u8) -> Option<Vec<u8>> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?;
    let mut decoder = reader.into_decoder().ok()?;
    let orientation = decoder.orientation().ok()?;

    let mut img = DynamicImage::from_decoder(decoder).ok()?;
    img.apply_orientation(orientation);

    let img = flatten_alpha(img);

    let img = if img.width().max(img.height()) > max_dimension {
        img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = img.into_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut Cursor::new(&mut out), quality)
        .encode_image(&rgb)
        .ok()?;

    Some(out)
}

/// Composite an image with an alpha channel onto a white background.
fn flatten_alpha(img: DynamicImage) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }

    let rgba = img.into_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (out, pixel) in flattened.pixels_mut().zip(rgba.pixels()) {
        let alpha = pixel[3] as u32;
        let blend = |channel: u8| ((channel as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        *out = Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]);
    }
    DynamicImage::ImageRgb8(flattened)
}
