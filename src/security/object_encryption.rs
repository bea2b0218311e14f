//! String and stream encryption over an object graph

use crate::crypto::PDFCryptoEngine;
use crate::error::PDFResult;
use crate::pdf::{Object, ObjectId, Stream};

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

/// Whether a stream payload stays in clear text
///
/// Cross-reference streams are never encrypted; metadata streams are exempt
/// when `/EncryptMetadata` is false.
pub(crate) fn is_exempt_stream(stream: &Stream, encrypt_metadata: bool) -> bool {
    let dict = stream.dict();
    dict.has_type("XRef") || (!encrypt_metadata && dict.has_type("Metadata"))
}

/// Encrypt every string and stream payload inside `object`
pub(crate) fn encrypt_object(engine: &PDFCryptoEngine, id: ObjectId, object: &mut Object) -> PDFResult<()> {
    transform(engine, id, object, Direction::Encrypt)
}

/// Decrypt every string and stream payload inside `object`
pub(crate) fn decrypt_object(engine: &PDFCryptoEngine, id: ObjectId, object: &mut Object) -> PDFResult<()> {
    transform(engine, id, object, Direction::Decrypt)
}

fn transform(engine: &PDFCryptoEngine, id: ObjectId, object: &mut Object, direction: Direction) -> PDFResult<()> {
    match object {
        Object::String(bytes) => {
            *bytes = match direction {
                Direction::Encrypt => engine.encrypt_string(id, bytes)?,
                Direction::Decrypt => engine.decrypt_string(id, bytes)?,
            };
        }
        Object::Array(items) => {
            for item in items {
                transform(engine, id, item, direction)?;
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                transform(engine, id, value, direction)?;
            }
        }
        Object::Stream(stream) => {
            if is_exempt_stream(stream, engine.encrypt_metadata()) {
                return Ok(());
            }
            for (_, value) in stream.dict_mut().iter_mut() {
                transform(engine, id, value, direction)?;
            }
            let payload = match direction {
                Direction::Encrypt => engine.encrypt_stream(id, stream.raw_data())?,
                Direction::Decrypt => engine.decrypt_stream(id, stream.raw_data())?,
            };
            stream.set_raw_data(payload);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptMethod;
    use crate::pdf::Dictionary;
    use pretty_assertions::assert_eq;

    fn sample() -> Object {
        let mut info = Dictionary::new();
        info.set("Title", Object::string("Quarterly report"));
        info.set("Names", Object::Array(vec![Object::string("a"), Object::name("Plain"), 3.into()]));
        Object::Dictionary(info)
    }

    #[test_log::test]
    fn test_nested_strings_round_trip() -> PDFResult<()> {
        let engine = PDFCryptoEngine::new(&[9; 16], CryptMethod::AESV2, CryptMethod::AESV2);
        let original = sample();
        let mut object = original.clone();

        encrypt_object(&engine, (4, 0), &mut object)?;
        assert_ne!(object, original);
        let dict = object.as_dict()?;
        assert_eq!(dict.get_array("Names").map(|a| a[1].clone()), Some(Object::name("Plain")));

        decrypt_object(&engine, (4, 0), &mut object)?;
        assert_eq!(object, original);
        Ok(())
    }

    #[test_log::test]
    fn test_stream_payload_and_length() -> PDFResult<()> {
        let engine = PDFCryptoEngine::new(&[1; 16], CryptMethod::RC4, CryptMethod::AESV2);
        let mut object = Object::Stream(Stream::new(Dictionary::new(), b"BT /F1 12 Tf ET".to_vec()));

        encrypt_object(&engine, (2, 0), &mut object)?;
        let stream = object.as_stream()?;
        assert_eq!(stream.raw_data().len(), 32);
        assert_eq!(stream.dict().get_i64("Length"), Some(32));

        decrypt_object(&engine, (2, 0), &mut object)?;
        assert_eq!(object.as_stream()?.raw_data(), b"BT /F1 12 Tf ET");
        Ok(())
    }

    #[test_log::test]
    fn test_metadata_exemption() -> PDFResult<()> {
        let engine = PDFCryptoEngine::new(&[1; 16], CryptMethod::RC4, CryptMethod::RC4).with_encrypt_metadata(false);
        let mut object = Object::Stream(Stream::new(Dictionary::with_type("Metadata"), b"<x:xmpmeta/>".to_vec()));

        encrypt_object(&engine, (6, 0), &mut object)?;
        assert_eq!(object.as_stream()?.raw_data(), b"<x:xmpmeta/>");
        Ok(())
    }
}
