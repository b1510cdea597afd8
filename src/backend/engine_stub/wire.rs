//! Wire framing for the in-process ingress, modeled on OP_MSG header
//! handling. Real network servers need a TCP-level `MsgHeader`; the
//! in-process backend doesn't open a socket, but it still frames each
//! command into a request message carrying `{requestId, payload}` and
//! decodes the response, so the harness adapter is exercised the same
//! way it would be against a real wire endpoint.

use std::io::Cursor;

use bson::Document;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub const OP_MSG: i32 = 2013;

/// Build an OP_MSG request frame carrying one command document.
pub fn encode_request(request_id: i32, doc: &Document) -> std::io::Result<Vec<u8>> {
    let body = bson::to_vec(doc).map_err(std::io::Error::other)?;
    let message_length = 16 + 4 + 1 + body.len() as i32;

    let mut buf = Vec::with_capacity(message_length as usize);
    WriteBytesExt::write_i32::<LittleEndian>(&mut buf, message_length)?;
    WriteBytesExt::write_i32::<LittleEndian>(&mut buf, request_id)?;
    WriteBytesExt::write_i32::<LittleEndian>(&mut buf, 0)?; // responseTo
    WriteBytesExt::write_i32::<LittleEndian>(&mut buf, OP_MSG)?;
    WriteBytesExt::write_u32::<LittleEndian>(&mut buf, 0)?; // flagBits
    WriteBytesExt::write_u8(&mut buf, 0)?; // section kind 0: body
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decode a request frame built by [`encode_request`] back into its
/// command document (the ingress side of the contract).
pub fn decode_request(frame: &[u8]) -> std::io::Result<Document> {
    let mut cursor = Cursor::new(frame);
    let _message_length = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)?;
    let _request_id = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)?;
    let _response_to = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)?;
    let _op_code = ReadBytesExt::read_i32::<LittleEndian>(&mut cursor)?;
    let _flag_bits = ReadBytesExt::read_u32::<LittleEndian>(&mut cursor)?;
    let _kind = ReadBytesExt::read_u8(&mut cursor)?;
    bson::from_reader(&mut cursor).map_err(std::io::Error::other)
}

/// Build an OP_MSG response frame carrying one response document.
pub fn encode_response(request_id: i32, doc: &Document) -> std::io::Result<Vec<u8>> {
    let body = bson::to_vec(doc).map_err(std::io::Error::other)?;
    let message_length = 16 + 4 + 1 + body.len() as i32;

    let mut buf = Vec::with_capacity(message_length as usize);
    WriteBytesExt::write_i32::<LittleEndian>(&mut buf, message_length)?;
    WriteBytesExt::write_i32::<LittleEndian>(&mut buf, request_id + 1)?;
    WriteBytesExt::write_i32::<LittleEndian>(&mut buf, request_id)?;
    WriteBytesExt::write_i32::<LittleEndian>(&mut buf, OP_MSG)?;
    WriteBytesExt::write_u32::<LittleEndian>(&mut buf, 0)?;
    WriteBytesExt::write_u8(&mut buf, 0)?;
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Decode a response frame built by [`encode_response`] back into its
/// response document (the harness side of the contract).
pub fn decode_response(frame: &[u8]) -> std::io::Result<Document> {
    decode_request(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn request_round_trips() {
        let original = doc! { "ping": 1_i32 };
        let frame = encode_request(7, &original).unwrap();
        let decoded = decode_request(&frame).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn response_round_trips() {
        let original = doc! { "ok": 1.0 };
        let frame = encode_response(7, &original).unwrap();
        let decoded = decode_response(&frame).unwrap();
        assert_eq!(original, decoded);
    }
}
