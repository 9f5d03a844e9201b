//! RC4 stream cipher, as used by the NTLM sealing keys.
//!
//! The cipher state persists across calls: NTLM seals every message of a
//! session with the same key stream.

pub(crate) struct Rc4 {
    i: usize,
    j: usize,
    state: [u8; 256],
}

impl Rc4 {
    pub(crate) fn new(key: &[u8]) -> Self {
        // Key scheduling.
        let mut state = [0u8; 256];
        for (i, item) in state.iter_mut().enumerate() {
            *item = i as u8;
        }

        let mut j = 0usize;
        for i in 0..256 {
            j = (j + state[i] as usize + key[i % key.len()] as usize) % 256;
            state.swap(i, j);
        }

        Self { i: 0, j: 0, state }
    }

    pub(crate) fn process(&mut self, message: &[u8]) -> Vec<u8> {
        let mut output = Vec::with_capacity(message.len());

        for byte in message {
            self.i = (self.i + 1) % 256;
            self.j = (self.j + self.state[self.i] as usize) % 256;
            self.state.swap(self.i, self.j);
            let idx_k = (self.state[self.i] as usize + self.state[self.j] as usize) % 256;
            output.push(self.state[idx_k] ^ byte);
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 6229-style check: key "Key", plaintext "Plaintext".
        let mut cipher = Rc4::new(b"Key");
        let encrypted = cipher.process(b"Plaintext");
        assert_eq!(encrypted, [0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
    }

    #[test]
    fn stream_continues_across_calls() {
        let mut one_shot = Rc4::new(b"secret");
        let expected = one_shot.process(b"hello world");

        let mut chunked = Rc4::new(b"secret");
        let mut actual = chunked.process(b"hello ");
        actual.extend(chunked.process(b"world"));

        assert_eq!(actual, expected);
    }

    #[test]
    fn empty_message() {
        let mut cipher = Rc4::new(b"key");
        assert!(cipher.process(&[]).is_empty());
    }
}
