//! RC4 stream cipher used by the standard security handler (revisions 2-4).
//!
//! RC4 is symmetric: the same keystream encrypts and decrypts.

/// RC4 cipher state for one key.
pub struct Arcfour {
    state: [u8; 256],
    i: u8,
    j: u8,
}

impl Arcfour {
    /// Schedule a new keystream.
    ///
    /// Keys longer than 256 bytes only use their first 256 bytes; an empty
    /// key degenerates to the identity permutation.
    pub fn new(key: &[u8]) -> Self {
        let mut state: [u8; 256] = std::array::from_fn(|i| i as u8);
        if !key.is_empty() {
            let key = &key[..key.len().min(256)];
            let mut j: u8 = 0;
            for i in 0..256 {
                j = j.wrapping_add(state[i]).wrapping_add(key[i % key.len()]);
                state.swap(i, j as usize);
            }
        }
        Self { state, i: 0, j: 0 }
    }

    /// XOR `data` with the next bytes of keystream, returning a new buffer.
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.apply_keystream(&mut out);
        out
    }

    /// XOR `data` with the keystream in place.
    pub fn apply_keystream(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            *byte ^= self.next_byte();
        }
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.state[self.i as usize]);
        self.state.swap(self.i as usize, self.j as usize);
        let idx = self.state[self.i as usize].wrapping_add(self.state[self.j as usize]);
        self.state[idx as usize]
    }
}

/// One-shot RC4 over `data` with a fresh keystream.
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    Arcfour::new(key).process(data)
}

/// The revision 3+ "20 rounds" construction: RC4 with the key XOR-ed by
/// each round number in `rounds`, feeding each output into the next round.
pub fn rc4_rounds(key: &[u8], data: &[u8], rounds: impl Iterator<Item = u8>) -> Vec<u8> {
    let mut out = data.to_vec();
    let mut round_key = vec![0u8; key.len()];
    for round in rounds {
        for (dst, src) in round_key.iter_mut().zip(key) {
            *dst = src ^ round;
        }
        Arcfour::new(&round_key).apply_keystream(&mut out);
    }
    out
}
