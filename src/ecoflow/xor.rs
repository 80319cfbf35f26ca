/// Single-byte XOR obfuscation used on header payloads with `enc_type == 1`.
///
/// The key is the low byte of the header's `seq`. Applying it twice gives
/// back the input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct XorCipher {
    key: u8,
}

impl XorCipher {
    pub fn new(key: u8) -> Self {
        Self { key }
    }

    pub fn from_seq(seq: i64) -> Self {
        Self::new((seq & 0xFF) as u8)
    }

    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn apply(&self, data: &[u8]) -> Vec<u8> {
        data.iter().map(|b| b ^ self.key).collect()
    }
}

pub fn decrypt(data: &[u8], seq: i64) -> Vec<u8> {
    XorCipher::from_seq(seq).apply(data)
}
