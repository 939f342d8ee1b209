use super::{F, N, THRESHOLD};

/// Sentinel for an empty link
const NIL: usize = N;

/// Sliding window with a binary search tree per leading byte.
///
/// Nodes are window positions, links are stored as index arrays. Roots live at `N + 1 + byte`
/// in the right-child array and `N` doubles as the nil slot.
pub(super) struct MatchTree {
    /// Window plus a mirror of its first `F - 1` bytes
    pub text_buf: Vec<u8>,
    lson: Vec<usize>,
    rson: Vec<usize>,
    dad: Vec<usize>,
    pub match_position: usize,
    pub match_length: usize,
}

impl MatchTree {
    pub fn new() -> Self {
        let mut text_buf = vec![0u8; N + F - 1];
        text_buf[..N - F].fill(b' ');

        Self {
            text_buf,
            lson: vec![NIL; N + 1],
            rson: vec![NIL; N + 257],
            dad: vec![NIL; N + 1],
            match_position: 0,
            match_length: 0,
        }
    }

    /// Insert the string starting at `r` and record the longest match against the tree.
    ///
    /// A full length match replaces the older node.
    pub fn insert_node(&mut self, r: usize) {
        let mut cmp = 1i32;
        let mut p = N + 1 + self.text_buf[r] as usize;
        self.rson[r] = NIL;
        self.lson[r] = NIL;
        self.match_length = 0;

        loop {
            if cmp >= 0 {
                if self.rson[p] != NIL {
                    p = self.rson[p];
                } else {
                    self.rson[p] = r;
                    self.dad[r] = p;
                    return;
                }
            } else if self.lson[p] != NIL {
                p = self.lson[p];
            } else {
                self.lson[p] = r;
                self.dad[r] = p;
                return;
            }

            let mut i = 1;
            while i < F {
                cmp = self.text_buf[r + i] as i32 - self.text_buf[p + i] as i32;
                if cmp != 0 {
                    break;
                }
                i += 1;
            }

            if i > THRESHOLD {
                let position = (r.wrapping_sub(p) & (N - 1)) - 1;
                if i > self.match_length {
                    self.match_position = position;
                    self.match_length = i;
                    if i >= F {
                        break;
                    }
                }
                // equal length: keep the nearer position
                if i == self.match_length && position < self.match_position {
                    self.match_position = position;
                }
            }
        }

        self.dad[r] = self.dad[p];
        self.lson[r] = self.lson[p];
        self.rson[r] = self.rson[p];
        let (left, right) = (self.lson[p], self.rson[p]);
        self.dad[left] = r;
        self.dad[right] = r;
        let parent = self.dad[p];
        if self.rson[parent] == p {
            self.rson[parent] = r;
        } else {
            self.lson[parent] = r;
        }
        self.dad[p] = NIL;
    }

    /// Remove position `p` from its tree, if present
    pub fn delete_node(&mut self, p: usize) {
        if self.dad[p] == NIL {
            return;
        }

        let q = if self.rson[p] == NIL {
            self.lson[p]
        } else if self.lson[p] == NIL {
            self.rson[p]
        } else {
            let mut q = self.lson[p];
            if self.rson[q] != NIL {
                while self.rson[q] != NIL {
                    q = self.rson[q];
                }
                let (q_parent, q_left) = (self.dad[q], self.lson[q]);
                self.rson[q_parent] = q_left;
                self.dad[q_left] = q_parent;
                self.lson[q] = self.lson[p];
                let p_left = self.lson[p];
                self.dad[p_left] = q;
            }
            self.rson[q] = self.rson[p];
            let p_right = self.rson[p];
            self.dad[p_right] = q;
            q
        };

        let parent = self.dad[p];
        self.dad[q] = parent;
        if self.rson[parent] == p {
            self.rson[parent] = q;
        } else {
            self.lson[parent] = q;
        }
        self.dad[p] = NIL;
    }
}
