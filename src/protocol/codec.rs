//! Big-endian primitive encoding
//!
//! All integers on the wire are big-endian. Strings carry a 2-byte length
//! prefix followed by UTF-8 bytes, matching the `DataOutput.writeUTF` layout
//! the server side emits for plain text.
//!
//! ```text
//! bool    1 byte  (0 = false)
//! int32   4 bytes
//! int64   8 bytes
//! float32 4 bytes (IEEE 754)
//! UTF     u16 length + bytes
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

fn ensure(buf: &Bytes, needed: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

pub fn read_u8(buf: &mut Bytes) -> Result<u8, ProtocolError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn read_bool(buf: &mut Bytes) -> Result<bool, ProtocolError> {
    Ok(read_u8(buf)? != 0)
}

pub fn read_i32(buf: &mut Bytes) -> Result<i32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32())
}

pub fn read_i64(buf: &mut Bytes) -> Result<i64, ProtocolError> {
    ensure(buf, 8)?;
    Ok(buf.get_i64())
}

pub fn read_f32(buf: &mut Bytes) -> Result<f32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_f32())
}

pub fn read_utf(buf: &mut Bytes) -> Result<String, ProtocolError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

pub fn write_utf(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    let len = u16::try_from(s.len()).map_err(|_| ProtocolError::StringTooLong(s.len()))?;
    buf.put_u16(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

pub fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf_layout() {
        let mut buf = BytesMut::new();
        write_utf(&mut buf, "lobby").unwrap();
        assert_eq!(&buf[..], &[0x00, 0x05, b'l', b'o', b'b', b'b', b'y']);

        let mut bytes = buf.freeze();
        assert_eq!(read_utf(&mut bytes).unwrap(), "lobby");
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_utf_multibyte() {
        let mut buf = BytesMut::new();
        write_utf(&mut buf, "экран").unwrap();
        // 5 cyrillic chars, 2 bytes each
        assert_eq!(&buf[..2], &[0x00, 0x0A]);
        assert_eq!(read_utf(&mut buf.freeze()).unwrap(), "экран");
    }

    #[test]
    fn test_utf_too_long() {
        let long = "x".repeat(70_000);
        let mut buf = BytesMut::new();
        assert_eq!(
            write_utf(&mut buf, &long),
            Err(ProtocolError::StringTooLong(70_000))
        );
    }

    #[test]
    fn test_truncated_reads() {
        let mut bytes = Bytes::from_static(&[0x00, 0x00, 0x01]);
        assert_eq!(
            read_i32(&mut bytes),
            Err(ProtocolError::Truncated {
                needed: 4,
                available: 3
            })
        );

        // Declared string length beyond the buffer
        let mut bytes = Bytes::from_static(&[0x00, 0x10, b'a']);
        assert!(matches!(
            read_utf(&mut bytes),
            Err(ProtocolError::Truncated { needed: 16, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let mut bytes = Bytes::from_static(&[0x00, 0x02, 0xC3, 0x28]);
        assert_eq!(read_utf(&mut bytes), Err(ProtocolError::InvalidUtf8));
    }

    #[test]
    fn test_big_endian_integers() {
        let mut bytes = Bytes::from_static(&[
            0x00, 0x00, 0x01, 0x00, // 256
            0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xD4, 0xC0, // 120000
        ]);
        assert_eq!(read_i32(&mut bytes).unwrap(), 256);
        assert_eq!(read_i64(&mut bytes).unwrap(), 120_000);
    }
}
