//! Minimal WebP container rewriting for carrying color profiles and EXIF.
//!
//! libwebp's simple encoder emits a bare `RIFF/WEBP/VP8 ` file. Metadata
//! chunks require the extended layout, so [`embed_metadata`] splits the
//! file into chunks and reassembles it in the order the container format
//! mandates:
//!
//! ```text
//! RIFF size WEBP
//!   VP8X  flags + canvas size
//!   ICCP  (optional)
//!   ALPH  (if present)
//!   VP8   image data
//!   EXIF  (optional)
//! ```

use super::backend::BackendError;

const FLAG_ICC: u8 = 0x20;
const FLAG_ALPHA: u8 = 0x10;
const FLAG_EXIF: u8 = 0x08;

/// JPEG APP1 payloads start with this marker; WebP EXIF chunks must not.
const EXIF_HEADER: &[u8] = b"Exif\0\0";

/// Largest canvas side the 24-bit VP8X fields can describe.
const MAX_CANVAS: u32 = 1 << 24;

struct Chunk<'a> {
    fourcc: [u8; 4],
    payload: &'a [u8],
}

/// Attach an ICC profile and/or EXIF blob to an encoded WebP.
///
/// Returns the input unchanged when there is nothing to embed.
pub fn embed_metadata(
    webp: &[u8],
    width: u32,
    height: u32,
    icc_profile: Option<&[u8]>,
    exif: Option<&[u8]>,
) -> Result<Vec<u8>, BackendError> {
    let icc_profile = icc_profile.filter(|p| !p.is_empty());
    let exif = exif
        .map(|e| e.strip_prefix(EXIF_HEADER).unwrap_or(e))
        .filter(|e| !e.is_empty());
    if icc_profile.is_none() && exif.is_none() {
        return Ok(webp.to_vec());
    }
    if width == 0 || height == 0 || width > MAX_CANVAS || height > MAX_CANVAS {
        return Err(BackendError::Encode(format!(
            "canvas {width}x{height} cannot be described by VP8X"
        )));
    }

    let chunks = split_chunks(webp)?;
    let mut flags = 0u8;
    let mut image_chunks = Vec::new();
    for chunk in chunks {
        match &chunk.fourcc {
            b"VP8X" => {
                if chunk.payload.first().is_some_and(|f| f & FLAG_ALPHA != 0) {
                    flags |= FLAG_ALPHA;
                }
            }
            // Replaced by ours below.
            b"ICCP" | b"EXIF" => {}
            b"ALPH" => {
                flags |= FLAG_ALPHA;
                image_chunks.push(chunk);
            }
            _ => image_chunks.push(chunk),
        }
    }
    if icc_profile.is_some() {
        flags |= FLAG_ICC;
    }
    if exif.is_some() {
        flags |= FLAG_EXIF;
    }

    let mut vp8x = Vec::with_capacity(10);
    vp8x.push(flags);
    vp8x.extend_from_slice(&[0, 0, 0]);
    vp8x.extend_from_slice(&u24_le(width - 1));
    vp8x.extend_from_slice(&u24_le(height - 1));

    let mut body = Vec::with_capacity(webp.len() + 64);
    body.extend_from_slice(b"WEBP");
    write_chunk(&mut body, b"VP8X", &vp8x)?;
    if let Some(icc) = icc_profile {
        write_chunk(&mut body, b"ICCP", icc)?;
    }
    for chunk in &image_chunks {
        write_chunk(&mut body, &chunk.fourcc, chunk.payload)?;
    }
    if let Some(exif) = exif {
        write_chunk(&mut body, b"EXIF", exif)?;
    }

    let riff_size = u32::try_from(body.len())
        .map_err(|_| BackendError::Encode("WebP file exceeds 4 GiB".to_string()))?;
    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_size.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

fn split_chunks(webp: &[u8]) -> Result<Vec<Chunk<'_>>, BackendError> {
    if webp.len() < 12 || &webp[0..4] != b"RIFF" || &webp[8..12] != b"WEBP" {
        return Err(BackendError::Encode("not a RIFF/WEBP file".to_string()));
    }
    let mut chunks = Vec::new();
    let mut pos = 12;
    while pos + 8 <= webp.len() {
        let mut fourcc = [0u8; 4];
        fourcc.copy_from_slice(&webp[pos..pos + 4]);
        let mut size = [0u8; 4];
        size.copy_from_slice(&webp[pos + 4..pos + 8]);
        let size = u32::from_le_bytes(size) as usize;
        let start = pos + 8;
        let end = start
            .checked_add(size)
            .filter(|&end| end <= webp.len())
            .ok_or_else(|| BackendError::Encode("truncated WebP chunk".to_string()))?;
        chunks.push(Chunk {
            fourcc,
            payload: &webp[start..end],
        });
        pos = end + (size & 1);
    }
    Ok(chunks)
}

fn write_chunk(out: &mut Vec<u8>, fourcc: &[u8; 4], payload: &[u8]) -> Result<(), BackendError> {
    let size = u32::try_from(payload.len())
        .map_err(|_| BackendError::Encode("WebP chunk exceeds 4 GiB".to_string()))?;
    out.extend_from_slice(fourcc);
    out.extend_from_slice(&size.to_le_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
    Ok(())
}

fn u24_le(value: u32) -> [u8; 3] {
    let b = value.to_le_bytes();
    [b[0], b[1], b[2]]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A structurally valid simple-format WebP with a fake 5-byte VP8 payload.
    fn simple_webp() -> Vec<u8> {
        let mut body = b"WEBP".to_vec();
        write_chunk(&mut body, b"VP8 ", b"\x01\x02\x03\x04\x05").unwrap();
        let mut out = b"RIFF".to_vec();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    fn fourccs(webp: &[u8]) -> Vec<String> {
        split_chunks(webp)
            .unwrap()
            .iter()
            .map(|c| String::from_utf8_lossy(&c.fourcc).to_string())
            .collect()
    }

    #[test]
    fn nothing_to_embed_is_identity() {
        let webp = simple_webp();
        assert_eq!(embed_metadata(&webp, 10, 10, None, None).unwrap(), webp);
        assert_eq!(
            embed_metadata(&webp, 10, 10, Some(b""), None).unwrap(),
            webp
        );
    }

    #[test]
    fn icc_and_exif_chunks_in_container_order() {
        let out = embed_metadata(&simple_webp(), 320, 240, Some(b"icc"), Some(b"II*\0")).unwrap();
        assert_eq!(fourccs(&out), vec!["VP8X", "ICCP", "VP8 ", "EXIF"]);

        let riff_size = u32::from_le_bytes(out[4..8].try_into().unwrap()) as usize;
        assert_eq!(riff_size + 8, out.len());
    }

    #[test]
    fn vp8x_flags_and_canvas() {
        let out = embed_metadata(&simple_webp(), 320, 240, Some(b"icc"), None).unwrap();
        let chunks = split_chunks(&out).unwrap();
        let vp8x = chunks[0].payload;
        assert_eq!(vp8x.len(), 10);
        assert_eq!(vp8x[0], FLAG_ICC);
        assert_eq!(&vp8x[4..7], &u24_le(319));
        assert_eq!(&vp8x[7..10], &u24_le(239));
    }

    #[test]
    fn odd_payloads_are_padded() {
        let out = embed_metadata(&simple_webp(), 1, 1, Some(b"abc"), None).unwrap();
        assert_eq!(out.len() % 2, 0);
        let chunks = split_chunks(&out).unwrap();
        assert_eq!(chunks[1].payload, b"abc");
        assert_eq!(chunks[2].payload, b"\x01\x02\x03\x04\x05");
    }

    #[test]
    fn jpeg_exif_header_is_stripped() {
        let out = embed_metadata(&simple_webp(), 1, 1, None, Some(b"Exif\0\0MM\0*")).unwrap();
        let chunks = split_chunks(&out).unwrap();
        assert_eq!(chunks[0].payload[0], FLAG_EXIF);
        assert_eq!(chunks.last().unwrap().payload, b"MM\0*");
    }

    #[test]
    fn alpha_flag_survives_rewrite() {
        let mut body = b"WEBP".to_vec();
        write_chunk(&mut body, b"VP8X", &[FLAG_ALPHA, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        write_chunk(&mut body, b"ALPH", b"aa").unwrap();
        write_chunk(&mut body, b"VP8 ", b"vv").unwrap();
        let mut webp = b"RIFF".to_vec();
        webp.extend_from_slice(&(body.len() as u32).to_le_bytes());
        webp.extend_from_slice(&body);

        let out = embed_metadata(&webp, 1, 1, Some(b"icc"), None).unwrap();
        assert_eq!(fourccs(&out), vec!["VP8X", "ICCP", "ALPH", "VP8 "]);
        assert_eq!(split_chunks(&out).unwrap()[0].payload[0], FLAG_ALPHA | FLAG_ICC);
    }

    #[test]
    fn garbage_input_rejected() {
        assert!(embed_metadata(b"not webp", 1, 1, Some(b"icc"), None).is_err());
        let mut truncated = simple_webp();
        truncated.truncate(truncated.len() - 2);
        assert!(embed_metadata(&truncated, 1, 1, Some(b"icc"), None).is_err());
    }
}
