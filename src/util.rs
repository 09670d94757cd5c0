//! Miscellaneous utility functions and constants used in the crate.

use std::io::{Read, Write};

use byteorder::{LittleEndian, NativeEndian, ReadBytesExt, WriteBytesExt};
use simple_sds_sbwt::bit_vector::BitVector;
use simple_sds_sbwt::serialize::Serialize;

pub const DNA_ALPHABET: [u8; 4] = [b'A', b'C', b'G', b'T'];

const fn build_acgt_table() -> [u8; 256] {
    let mut table = [255_u8; 256];
    let mut i = 0;
    while i < DNA_ALPHABET.len() {
        table[DNA_ALPHABET[i] as usize] = i as u8;
        table[DNA_ALPHABET[i].to_ascii_lowercase() as usize] = i as u8;
        i += 1;
    }
    table
}

// A table mapping mapping ascii A -> 0, C -> 1, G -> 2, T -> 3. Same for lower case.
// All other charcters map to 255.
pub const ACGT_TO_0123: [u8; 256] = build_acgt_table();

// Upper bound for pre-allocations sized by a count read from a file
pub(crate) const MAX_PREALLOC: usize = 1 << 16;

pub(crate) fn is_dna(c: u8) -> bool {
    ACGT_TO_0123[c as usize] != 255
}

// Returns the number of bytes written
pub(crate) fn write_u64_slice<W: Write>(out: &mut W, values: &[u64]) -> std::io::Result<usize> {
    out.write_u64::<LittleEndian>(values.len() as u64)?;
    for &x in values {
        out.write_u64::<LittleEndian>(x)?;
    }
    Ok(8 * (values.len() + 1))
}

pub(crate) fn read_u64_vec<R: Read>(input: &mut R) -> std::io::Result<Vec<u64>> {
    let len = input.read_u64::<LittleEndian>()? as usize;
    let mut values = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        values.push(input.read_u64::<LittleEndian>()?);
    }
    Ok(values)
}

// Every string is written as its byte length followed by the UTF-8 bytes.
// Returns the number of bytes written.
pub(crate) fn write_string_vec<W: Write>(out: &mut W, strings: &[String]) -> std::io::Result<usize> {
    let mut n_written = 8;
    out.write_u64::<LittleEndian>(strings.len() as u64)?;
    for s in strings {
        out.write_u64::<LittleEndian>(s.len() as u64)?;
        out.write_all(s.as_bytes())?;
        n_written += 8 + s.len();
    }
    Ok(n_written)
}

pub(crate) fn read_string_vec<R: Read>(input: &mut R) -> std::io::Result<Vec<String>> {
    let len = input.read_u64::<LittleEndian>()? as usize;
    let mut strings = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        let n_bytes = input.read_u64::<LittleEndian>()?;
        let mut buf = Vec::<u8>::new();
        input.by_ref().take(n_bytes).read_to_end(&mut buf)?;
        if buf.len() as u64 != n_bytes {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "string ends early"));
        }
        let s = String::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        strings.push(s);
    }
    Ok(strings)
}

fn invalid_data(msg: &'static str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

/// Reads a [BitVector] written with its [Serialize] implementation.
///
/// The word count in the header is checked against the bit length, and the words are read
/// only as far as the input actually has them, so a corrupt header gives an error instead
/// of a huge allocation. Rank and select structures stored with the vector are skipped.
pub(crate) fn read_bit_vector<R: Read>(input: &mut R) -> std::io::Result<BitVector> {
    let ones = input.read_u64::<NativeEndian>()?;
    let len = input.read_u64::<NativeEndian>()?;
    let n_words = input.read_u64::<NativeEndian>()?;
    if n_words != len.div_ceil(64) {
        return Err(invalid_data("bit vector: word count does not match the length"));
    }
    if ones > len {
        return Err(invalid_data("bit vector: too many set bits"));
    }
    let n_bytes = n_words.checked_mul(8).ok_or_else(|| invalid_data("bit vector: too many words"))?;

    let mut buf = Vec::<u8>::with_capacity(24);
    buf.write_u64::<NativeEndian>(ones)?;
    buf.write_u64::<NativeEndian>(len)?;
    buf.write_u64::<NativeEndian>(n_words)?;
    input.by_ref().take(n_bytes).read_to_end(&mut buf)?;
    if buf.len() as u64 != 24 + n_bytes {
        return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "bit vector ends early"));
    }

    // Rank, select and select-zero support, each a size in words followed by the body
    for _ in 0..3 {
        let n_support_words = input.read_u64::<NativeEndian>()?;
        let n_support_bytes = n_support_words.checked_mul(8).ok_or_else(|| invalid_data("bit vector: support structure too large"))?;
        let skipped = std::io::copy(&mut input.by_ref().take(n_support_bytes), &mut std::io::sink())?;
        if skipped != n_support_bytes {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "bit vector ends early"));
        }
        buf.write_u64::<NativeEndian>(0)?;
    }

    BitVector::load(&mut buf.as_slice())
}

/// Extracts the accession-version token from a pipe-delimited sequence header such as
/// `gi|556503834|ref|NC_000913.3|`. The token is the field with index 3.
pub fn accession_from_header(header: &str) -> Option<&str> {
    header.split('|').nth(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simple_sds_sbwt::ops::Rank;

    #[test]
    fn acgt_table() {
        assert_eq!(ACGT_TO_0123[b'A' as usize], 0);
        assert_eq!(ACGT_TO_0123[b'c' as usize], 1);
        assert_eq!(ACGT_TO_0123[b'G' as usize], 2);
        assert_eq!(ACGT_TO_0123[b't' as usize], 3);
        assert!(!is_dna(b'N'));
        assert!(!is_dna(b'$'));
        assert!(is_dna(b'g'));
    }

    #[test]
    fn accession_parsing() {
        assert_eq!(accession_from_header("gi|556503834|ref|NC_000913.3|"), Some("NC_000913.3"));
        assert_eq!(accession_from_header("gi|1|emb|X1.2"), Some("X1.2"));
        assert_eq!(accession_from_header("NC_000913.3"), None);
    }

    #[test]
    fn string_vec_serialization() {
        let strings = vec!["NC_1.1".to_string(), String::new(), "ÅÄÖ".to_string()];
        let mut buf = Vec::<u8>::new();
        let n = write_string_vec(&mut buf, &strings).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(read_string_vec(&mut buf.as_slice()).unwrap(), strings);

        let values = vec![0_u64, 7, u64::MAX];
        let mut buf = Vec::<u8>::new();
        assert_eq!(write_u64_slice(&mut buf, &values).unwrap(), buf.len());
        assert_eq!(read_u64_vec(&mut buf.as_slice()).unwrap(), values);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let strings = vec!["NC_000913.3".to_string()];
        let mut buf = Vec::<u8>::new();
        write_string_vec(&mut buf, &strings).unwrap();
        buf.truncate(buf.len() - 2);
        assert!(read_string_vec(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn huge_counts_are_errors() {
        // One string whose length field claims half the address space
        let mut buf = Vec::<u8>::new();
        buf.write_u64::<LittleEndian>(1).unwrap();
        buf.write_u64::<LittleEndian>(u64::MAX / 2).unwrap();
        buf.extend_from_slice(b"NC_1.1");
        let err = read_string_vec(&mut buf.as_slice()).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

        // Vector counts far beyond the data
        let mut buf = Vec::<u8>::new();
        buf.write_u64::<LittleEndian>(1 << 40).unwrap();
        buf.write_u64::<LittleEndian>(7).unwrap();
        assert!(read_string_vec(&mut buf.as_slice()).is_err());
        assert!(read_u64_vec(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn bit_vector_reading() {
        let bv: BitVector = [true, false, false, true, true].into_iter().collect();
        let mut buf = Vec::<u8>::new();
        bv.serialize(&mut buf).unwrap();
        buf.extend_from_slice(b"rest");
        let mut input = buf.as_slice();
        assert_eq!(read_bit_vector(&mut input).unwrap(), bv);
        assert_eq!(input, b"rest");

        let mut with_rank = bv.clone();
        with_rank.enable_rank();
        let mut buf = Vec::<u8>::new();
        with_rank.serialize(&mut buf).unwrap();
        let mut input = buf.as_slice();
        assert_eq!(read_bit_vector(&mut input).unwrap(), bv);
        assert!(input.is_empty());
    }

    #[test]
    fn garbage_bit_vectors_are_errors() {
        let garbage = [0xFF_u8; 32];
        let err = read_bit_vector(&mut garbage.as_slice()).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);

        // A consistent header for 2^62 bits with only one word of data behind it
        let mut buf = Vec::<u8>::new();
        buf.write_u64::<NativeEndian>(0).unwrap();
        buf.write_u64::<NativeEndian>(1 << 62).unwrap();
        buf.write_u64::<NativeEndian>(1 << 56).unwrap();
        buf.write_u64::<NativeEndian>(0).unwrap();
        let err = read_bit_vector(&mut buf.as_slice()).err().unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);

        let bv: BitVector = [true, true].into_iter().collect();
        let mut buf = Vec::<u8>::new();
        bv.serialize(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(read_bit_vector(&mut buf.as_slice()).is_err());
    }
}
