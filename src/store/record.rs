//! Binary codec for one cache record.
//!
//! Layout, all integers big-endian, written back-to-back with no header,
//! footer or checksum:
//!
//! ```text
//! str(uri) str(title) str(album) str(artist) str(genre) str(album_artist)
//! i32 image_len [image_len bytes]
//! i32 rating  i32 track_count  i32 track_number  i32 year  i32 duration_ms
//! ```
//!
//! where `str` is a u16 byte-length prefix followed by UTF-8 bytes.
//! `image_len == 0` means "no embedded image" and decodes to
//! [`Artwork::Placeholder`].

use std::io::{self, Read, Write};

use crate::track::{Artwork, TrackMeta};

fn write_str<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("string field of {} bytes exceeds the u16 length prefix", bytes.len()),
        ));
    }
    w.write_all(&(bytes.len() as u16).to_be_bytes())?;
    w.write_all(bytes)
}

fn read_str<R: Read>(r: &mut R) -> io::Result<String> {
    let mut len = [0u8; 2];
    r.read_exact(&mut len)?;
    let mut buf = vec![0u8; u16::from_be_bytes(len) as usize];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("non-UTF-8 string field: {e}")))
}

fn write_i32<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

/// Serialize one record. When `embed_image` is false the image field is
/// written as zero-length regardless of the in-memory artwork.
pub(super) fn write_record<W: Write>(
    w: &mut W,
    uri: &str,
    meta: &TrackMeta,
    embed_image: bool,
) -> io::Result<()> {
    write_str(w, uri)?;
    write_str(w, &meta.title)?;
    write_str(w, &meta.album)?;
    write_str(w, &meta.artist)?;
    write_str(w, &meta.genre)?;
    write_str(w, &meta.album_artist)?;

    let image = if embed_image { meta.artwork.bytes() } else { &[] };
    if image.len() > i32::MAX as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "embedded image exceeds the i32 length prefix",
        ));
    }
    write_i32(w, image.len() as i32)?;
    w.write_all(image)?;

    write_i32(w, meta.rating)?;
    write_i32(w, meta.track_count)?;
    write_i32(w, meta.track_number)?;
    write_i32(w, meta.year)?;
    write_i32(w, meta.duration_ms)
}

/// Deserialize one record. A premature end of input surfaces as
/// `ErrorKind::UnexpectedEof`; a structurally invalid field (negative
/// image length, non-UTF-8 text) as `ErrorKind::InvalidData`. Both mean
/// the file can no longer be trusted past this point.
pub(super) fn read_record<R: Read>(r: &mut R) -> io::Result<(String, TrackMeta)> {
    let uri = read_str(r)?;
    let title = read_str(r)?;
    let album = read_str(r)?;
    let artist = read_str(r)?;
    let genre = read_str(r)?;
    let album_artist = read_str(r)?;

    let image_len = read_i32(r)?;
    if image_len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("negative image length {image_len}"),
        ));
    }
    let artwork = if image_len == 0 {
        Artwork::Placeholder
    } else {
        let mut buf = vec![0u8; image_len as usize];
        r.read_exact(&mut buf)?;
        Artwork::Embedded(buf)
    };

    let rating = read_i32(r)?;
    let track_count = read_i32(r)?;
    let track_number = read_i32(r)?;
    let year = read_i32(r)?;
    let duration_ms = read_i32(r)?;

    Ok((
        uri,
        TrackMeta {
            title,
            artist,
            album,
            genre,
            album_artist,
            artwork,
            rating,
            track_count,
            track_number,
            year,
            duration_ms,
            play_count: 0,
        },
    ))
}

/// Serialized size of a record without writing it.
#[cfg(test)]
pub(super) fn record_len(uri: &str, meta: &TrackMeta, embed_image: bool) -> usize {
    let strings = [
        uri,
        &meta.title,
        &meta.album,
        &meta.artist,
        &meta.genre,
        &meta.album_artist,
    ];
    let image = if embed_image { meta.artwork.bytes().len() } else { 0 };
    strings.iter().map(|s| 2 + s.len()).sum::<usize>() + 4 + image + 5 * 4
}
