//! Declarative fixed-offset frame layouts
//!
//! Binary protocols describe their payloads as a table of typed fields at
//! fixed offsets. Tables are checked by [`FrameLayout::validate`] in each
//! decoder's tests so a typo in an offset fails the build's test run
//! instead of silently reading the wrong bytes.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl FieldType {
    pub const fn size(self) -> usize {
        match self {
            FieldType::U8 | FieldType::I8 => 1,
            FieldType::U16 | FieldType::I16 => 2,
            FieldType::U32 | FieldType::I32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    pub ty: FieldType,
}

impl Field {
    pub const fn new(name: &'static str, offset: usize, ty: FieldType) -> Self {
        Self { name, offset, ty }
    }
}

#[derive(Debug)]
pub struct FrameLayout {
    pub name: &'static str,
    pub len: usize,
    pub endian: Endian,
    pub fields: &'static [Field],
}

impl FrameLayout {
    /// Integer value of `field` in `frame`, `None` if the frame is too short
    pub fn get(&self, frame: &[u8], field: &Field) -> Option<i64> {
        let bytes = frame.get(field.offset..field.offset + field.ty.size())?;
        let v = match (field.ty, self.endian) {
            (FieldType::U8, _) => bytes[0] as i64,
            (FieldType::I8, _) => bytes[0] as i8 as i64,
            (FieldType::U16, Endian::Little) => u16::from_le_bytes([bytes[0], bytes[1]]) as i64,
            (FieldType::U16, Endian::Big) => u16::from_be_bytes([bytes[0], bytes[1]]) as i64,
            (FieldType::I16, Endian::Little) => i16::from_le_bytes([bytes[0], bytes[1]]) as i64,
            (FieldType::I16, Endian::Big) => i16::from_be_bytes([bytes[0], bytes[1]]) as i64,
            (FieldType::U32, Endian::Little) => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64
            }
            (FieldType::U32, Endian::Big) => {
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64
            }
            (FieldType::I32, Endian::Little) => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64
            }
            (FieldType::I32, Endian::Big) => {
                i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64
            }
        };
        Some(v)
    }

    /// Value as float, `0.0` when out of range (only possible if the
    /// frame is shorter than `len`)
    pub fn f64(&self, frame: &[u8], field: &Field) -> f64 {
        self.get(frame, field).unwrap_or(0) as f64
    }

    /// Fields must lie inside the frame and must not overlap
    pub fn validate(&self) -> Result<(), String> {
        let mut used = vec![false; self.len];
        for f in self.fields {
            let end = f.offset + f.ty.size();
            if end > self.len {
                return Err(format!("{}.{} ends at {} past frame length {}", self.name, f.name, end, self.len));
            }
            for slot in &mut used[f.offset..end] {
                if *slot {
                    return Err(format!("{}.{} overlaps another field", self.name, f.name));
                }
                *slot = true;
            }
        }
        Ok(())
    }

    /// Encode values into a zeroed frame, for building test fixtures
    pub fn encode(&self, values: &[(&Field, i64)]) -> Vec<u8> {
        let mut frame = vec![0u8; self.len];
        for (field, value) in values {
            let dst = &mut frame[field.offset..field.offset + field.ty.size()];
            let v = *value;
            match (field.ty, self.endian) {
                (FieldType::U8 | FieldType::I8, _) => dst[0] = v as u8,
                (FieldType::U16 | FieldType::I16, Endian::Little) => {
                    dst.copy_from_slice(&(v as u16).to_le_bytes())
                }
                (FieldType::U16 | FieldType::I16, Endian::Big) => {
                    dst.copy_from_slice(&(v as u16).to_be_bytes())
                }
                (FieldType::U32 | FieldType::I32, Endian::Little) => {
                    dst.copy_from_slice(&(v as u32).to_le_bytes())
                }
                (FieldType::U32 | FieldType::I32, Endian::Big) => {
                    dst.copy_from_slice(&(v as u32).to_be_bytes())
                }
            }
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Field = Field::new("a", 0, FieldType::I16);
    const B: Field = Field::new("b", 2, FieldType::U32);
    const C: Field = Field::new("c", 1, FieldType::U8);

    static LE: FrameLayout = FrameLayout {
        name: "le",
        len: 6,
        endian: Endian::Little,
        fields: &[A, B],
    };

    static BE: FrameLayout = FrameLayout {
        name: "be",
        len: 6,
        endian: Endian::Big,
        fields: &[A, B],
    };

    #[test]
    fn test_little_endian_read() {
        let frame = [0xFE, 0xFF, 0x01, 0x00, 0x00, 0x00];
        assert_eq!(LE.get(&frame, &A), Some(-2));
        assert_eq!(LE.get(&frame, &B), Some(1));
    }

    #[test]
    fn test_big_endian_read() {
        let frame = [0x00, 0x0A, 0x00, 0x00, 0x01, 0x00];
        assert_eq!(BE.get(&frame, &A), Some(10));
        assert_eq!(BE.get(&frame, &B), Some(256));
    }

    #[test]
    fn test_short_frame_is_none() {
        assert_eq!(LE.get(&[0x00, 0x01, 0x02], &B), None);
    }

    #[test]
    fn test_encode_matches_read() {
        let frame = BE.encode(&[(&A, -300), (&B, 70_000)]);
        assert_eq!(BE.get(&frame, &A), Some(-300));
        assert_eq!(BE.get(&frame, &B), Some(70_000));
    }

    #[test]
    fn test_validate_rejects_overlap_and_overrun() {
        assert!(LE.validate().is_ok());
        let overlap = FrameLayout {
            name: "bad",
            len: 6,
            endian: Endian::Little,
            fields: &[A, C],
        };
        assert!(overlap.validate().is_err());
        let overrun = FrameLayout {
            name: "bad",
            len: 4,
            endian: Endian::Little,
            fields: &[B],
        };
        assert!(overrun.validate().unwrap_err().contains("past frame length"));
    }
}
