//! In-memory message triple held in inboxes.
//!
//! The payload stays opaque (`Vec<u8>`) at this layer; decoding into a
//! concrete `T` happens at the `Comm::recv` call site, not here.

#[derive(Debug, Clone)]
pub struct Message {
    pub src: u32,
    pub dest: u32,
    pub tag: u32,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(src: u32, dest: u32, tag: u32, payload: Vec<u8>) -> Self {
        Self {
            src,
            dest,
            tag,
            payload,
        }
    }
}
