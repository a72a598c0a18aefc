//! Little-endian binary layout for dense `f32` matrices.
//!
//! ```text
//! magic[4] | version u32 | build_id [16] | tag u32 | rows u64 | dim u64 | rows*dim f32
//! ```
//!
//! `tag` carries the index metric for index artifacts and is zero for the
//! embedding matrix. Values are stored as raw bits so a round trip is exact.

use uuid::Uuid;

use crate::rag::index::Metric;

pub const EMBEDDINGS_MAGIC: [u8; 4] = *b"RAGE";
pub const INDEX_MAGIC: [u8; 4] = *b"RAGI";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 16 + 4 + 8 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    pub build_id: Uuid,
    pub tag: u32,
    pub rows: usize,
    pub dim: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }
}

pub fn encode<'a, I>(magic: [u8; 4], build_id: Uuid, tag: u32, dim: usize, rows: I) -> Vec<u8>
where
    I: ExactSizeIterator<Item = &'a [f32]>,
{
    let count = rows.len();
    let mut out = Vec::with_capacity(HEADER_LEN + count * dim * 4);
    out.extend_from_slice(&magic);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(build_id.as_bytes());
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&(count as u64).to_le_bytes());
    out.extend_from_slice(&(dim as u64).to_le_bytes());
    for row in rows {
        for value in row {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out
}

/// Decode a matrix, describing any structural problem as a plain message.
pub fn decode(magic: [u8; 4], bytes: &[u8]) -> Result<Matrix, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("file truncated: {} bytes", bytes.len()));
    }
    if bytes[0..4] != magic {
        return Err("bad magic".to_string());
    }

    let version = u32::from_le_bytes(take::<4>(bytes, 4));
    if version != VERSION {
        return Err(format!("unsupported format version {}", version));
    }

    let build_id = Uuid::from_bytes(take::<16>(bytes, 8));
    let tag = u32::from_le_bytes(take::<4>(bytes, 24));
    let rows = u64::from_le_bytes(take::<8>(bytes, 28)) as usize;
    let dim = u64::from_le_bytes(take::<8>(bytes, 36)) as usize;
    if dim == 0 && rows > 0 {
        return Err(format!("{} rows of dimension 0", rows));
    }

    let expected = rows
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| "matrix size overflows".to_string())?;
    if bytes.len() != expected {
        return Err(format!(
            "expected {} bytes for {}x{} matrix, found {}",
            expected,
            rows,
            dim,
            bytes.len()
        ));
    }

    let data = bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    Ok(Matrix {
        build_id,
        tag,
        rows,
        dim,
        data,
    })
}

pub fn metric_tag(metric: Metric) -> u32 {
    match metric {
        Metric::L2 => 0,
        Metric::InnerProduct => 1,
        Metric::Cosine => 2,
    }
}

pub fn metric_from_tag(tag: u32) -> Option<Metric> {
    match tag {
        0 => Some(Metric::L2),
        1 => Some(Metric::InnerProduct),
        2 => Some(Metric::Cosine),
        _ => None,
    }
}

fn take<const N: usize>(bytes: &[u8], at: usize) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[at..at + N]);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_bit_exact() {
        let rows = vec![
            vec![0.1f32, -0.0, f32::MIN_POSITIVE],
            vec![1e-38, 3.402_823e38, -7.25],
        ];
        let id = Uuid::new_v4();
        let bytes = encode(
            EMBEDDINGS_MAGIC,
            id,
            0,
            3,
            rows.iter().map(|r| r.as_slice()),
        );

        let matrix = decode(EMBEDDINGS_MAGIC, &bytes).unwrap();
        assert_eq!(matrix.build_id, id);
        assert_eq!((matrix.rows, matrix.dim), (2, 3));
        for (i, row) in rows.iter().enumerate() {
            let decoded: Vec<u32> = matrix.row(i).iter().map(|v| v.to_bits()).collect();
            let original: Vec<u32> = row.iter().map(|v| v.to_bits()).collect();
            assert_eq!(decoded, original);
        }
    }

    #[test]
    fn test_truncated_file_rejected() {
        let rows = vec![vec![1.0f32, 2.0]];
        let bytes = encode(INDEX_MAGIC, Uuid::nil(), 1, 2, rows.iter().map(|r| r.as_slice()));

        let err = decode(INDEX_MAGIC, &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(err.contains("expected"));
        assert_eq!(decode(INDEX_MAGIC, &bytes[..10]).unwrap_err(), "file truncated: 10 bytes");
    }

    #[test]
    fn test_rows_without_dimension_rejected() {
        let mut bytes = encode(INDEX_MAGIC, Uuid::nil(), 0, 0, std::iter::empty::<&[f32]>());
        bytes[28..36].copy_from_slice(&(u64::MAX / 2).to_le_bytes());

        let err = decode(INDEX_MAGIC, &bytes).unwrap_err();
        assert!(err.contains("dimension 0"));
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let bytes = encode(INDEX_MAGIC, Uuid::nil(), 0, 0, std::iter::empty::<&[f32]>());
        assert_eq!(decode(EMBEDDINGS_MAGIC, &bytes).unwrap_err(), "bad magic");
    }

    #[test]
    fn test_metric_tags() {
        for metric in [Metric::L2, Metric::InnerProduct, Metric::Cosine] {
            assert_eq!(metric_from_tag(metric_tag(metric)), Some(metric));
        }
        assert_eq!(metric_from_tag(9), None);
    }
}
