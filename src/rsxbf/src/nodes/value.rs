
use std::fmt;

use super::*;

/// A decoded inline property value.
///
/// Composite source encodings (thickness, grid length, color, duration)
/// normalize to the string form the XAML serializer would emit, so only the
/// four scalar shapes survive decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Float(f32),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}

/// # Inline value encoding
///
/// A property value is a one-byte tag followed by a tag-specific payload:
///
/// | Tag  | Payload | Produced value |
/// | ---- | ------- | -------------- |
/// | 0x01 | -       | `false` |
/// | 0x02 | -       | `true` |
/// | 0x03 | f32     | float |
/// | 0x04 | i32     | int |
/// | 0x05 | u16     | string table entry |
/// | 0x06 | 4 x f32 | thickness `l,t,r,b`, normalized |
/// | 0x07 | i32+f32 | grid length: `Auto`, a number, `*` or `n*` |
/// | 0x08 | 4 x u8  | color `B G R A`, rendered `#AARRGGBB` |
/// | 0x09 | string  | length-prefixed UTF-16 (durations) |
/// | 0x0A | -       | empty string |
/// | 0x0B | u16+i32 | enum id and value, resolved through the oracle |
pub(crate) fn read_value(buffer: &mut Buffer, names: &NameResolver) -> Result<Value> {
    let tag = buffer.read_u8()?;
    match tag {
        0x01 => Ok(Value::Bool(false)),
        0x02 => Ok(Value::Bool(true)),
        0x03 => Ok(Value::Float(buffer.read_f32::<LittleEndian>()?)),
        0x04 => Ok(Value::Int(buffer.read_i32::<LittleEndian>()?)),
        0x05 => {
            let position = buffer.position();
            let id = buffer.read_u16::<LittleEndian>()?;
            match names.string(id) {
                Some(s) => Ok(Value::Str(s.to_string())),
                None => Err(XbfError::UnexpectedByte { position }),
            }
        }
        0x06 => {
            let left = buffer.read_f32::<LittleEndian>()?;
            let top = buffer.read_f32::<LittleEndian>()?;
            let right = buffer.read_f32::<LittleEndian>()?;
            let bottom = buffer.read_f32::<LittleEndian>()?;
            if left == top && top == right && right == bottom {
                Ok(Value::Float(left))
            } else if left == right && top == bottom {
                Ok(Value::Str(format!("{},{}", left, top)))
            } else {
                Ok(Value::Str(format!("{},{},{},{}", left, top, right, bottom)))
            }
        }
        0x07 => {
            let kind = buffer.read_i32::<LittleEndian>()?;
            let value = buffer.read_f32::<LittleEndian>()?;
            match kind {
                0 => Ok(Value::Str("Auto".to_string())),
                1 => Ok(Value::Float(value)),
                2 if value == 1.0 => Ok(Value::Str("*".to_string())),
                2 => Ok(Value::Str(format!("{}*", value))),
                _ => Err(XbfError::UnknownValueType { tag }),
            }
        }
        0x08 => {
            let b = buffer.read_u8()?;
            let g = buffer.read_u8()?;
            let r = buffer.read_u8()?;
            let a = buffer.read_u8()?;
            Ok(Value::Str(format!("#{:02X}{:02X}{:02X}{:02X}", a, r, g, b)))
        }
        0x09 => Ok(Value::Str(buffer.read_len_string()?)),
        0x0A => Ok(Value::Str(String::new())),
        0x0B => {
            let enum_id = buffer.read_u16::<LittleEndian>()?;
            let value = buffer.read_i32::<LittleEndian>()?;
            Ok(Value::Str(names.enum_value(enum_id, value)))
        }
        _ => Err(XbfError::UnknownValueType { tag }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::NoFramework;
    use crate::metadata::XbfMetadata;
    use std::io::Cursor;

    fn decode(bytes: &[u8]) -> Result<Value> {
        let metadata = empty_metadata();
        let names = NameResolver::new(&metadata, &NoFramework);
        read_value(&mut Cursor::new(bytes.to_vec()), &names)
    }

    fn empty_metadata() -> XbfMetadata {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0x58, 0x42, 0x46, 0x00]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        for _ in 0..6 {
            bytes.extend_from_slice(&0u64.to_le_bytes());
        }
        bytes.extend_from_slice(&[0u8; 64]);
        for _ in 0..7 {
            bytes.extend_from_slice(&0i32.to_le_bytes());
        }
        XbfMetadata::read_from(&mut Cursor::new(bytes)).unwrap()
    }

    fn thickness(l: f32, t: f32, r: f32, b: f32) -> Vec<u8> {
        let mut bytes = vec![0x06];
        for v in [l, t, r, b] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn booleans() {
        assert_eq!(decode(&[0x01]).unwrap(), Value::Bool(false));
        assert_eq!(decode(&[0x02]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn uniform_thickness_collapses_to_scalar() {
        let v = decode(&thickness(4.0, 4.0, 4.0, 4.0)).unwrap();
        assert_eq!(v, Value::Float(4.0));
        assert_eq!(v.to_string(), "4");
    }

    #[test]
    fn symmetric_thickness_uses_two_components() {
        let v = decode(&thickness(8.0, 2.0, 8.0, 2.0)).unwrap();
        assert_eq!(v, Value::Str("8,2".to_string()));
    }

    #[test]
    fn general_thickness_uses_four_components() {
        let v = decode(&thickness(1.0, 2.0, 3.0, 4.0)).unwrap();
        assert_eq!(v, Value::Str("1,2,3,4".to_string()));
    }

    #[test]
    fn grid_lengths() {
        let grid = |kind: i32, value: f32| {
            let mut bytes = vec![0x07];
            bytes.extend_from_slice(&kind.to_le_bytes());
            bytes.extend_from_slice(&value.to_le_bytes());
            decode(&bytes).unwrap()
        };
        assert_eq!(grid(0, 0.0), Value::Str("Auto".to_string()));
        assert_eq!(grid(1, 120.0), Value::Float(120.0));
        assert_eq!(grid(2, 1.0), Value::Str("*".to_string()));
        assert_eq!(grid(2, 0.5), Value::Str("0.5*".to_string()));
    }

    #[test]
    fn color_renders_argb() {
        let v = decode(&[0x08, 0x33, 0x22, 0x11, 0xFF]).unwrap();
        assert_eq!(v, Value::Str("#FF112233".to_string()));
    }

    #[test]
    fn empty_string_tag() {
        assert_eq!(decode(&[0x0A]).unwrap(), Value::Str(String::new()));
    }

    #[test]
    fn unresolved_enum_falls_back() {
        let mut bytes = vec![0x0B];
        bytes.extend_from_slice(&0x0123u16.to_le_bytes());
        bytes.extend_from_slice(&3i32.to_le_bytes());
        assert_eq!(decode(&bytes).unwrap(), Value::Str("(Enum0x0123)3".to_string()));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = decode(&[0x42]).unwrap_err();
        assert!(matches!(err, XbfError::UnknownValueType { tag: 0x42 }));
    }
}
