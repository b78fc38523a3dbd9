use crate::constants;

/// MIX for round `d` and word pair `j`.
pub struct Mix{
    d: usize,
    j: usize
}

impl Mix {
    pub fn new(d: usize, j: usize) -> Mix {
        Mix {d,j}
    }

    fn rotation(&self) -> u32 {
        constants::R4[self.d % 8][self.j]
    }

    pub fn mix(&self, x0: u64, x1: u64) -> (u64, u64) {
        let y0 = x0.wrapping_add(x1);
        let y1 = x1.rotate_left(self.rotation()) ^ y0;
        (y0, y1)
    }

    pub fn demix(&self, y0: u64, y1: u64) -> (u64, u64) {
        let x1 = (y1 ^ y0).rotate_right(self.rotation());
        let x0 = y0.wrapping_sub(x1);
        (x0, x1)
    }
}
