use rand::Rng;

/// 64 characters in ASCII order, so lexicographic order of generated ids
/// equals generation order.
const ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TAIL_LEN: usize = 12;

/// Mints store-assigned child keys: 8 characters encoding the creation time
/// in millis, then 12 random characters. Ids minted within the same
/// millisecond reuse the previous tail incremented by one, so insertion
/// order survives even under bursts.
#[derive(Debug)]
pub(crate) struct PushIdGenerator {
    last_millis: i64,
    // Alphabet indices, not characters.
    last_tail: [u8; TAIL_LEN],
}

impl PushIdGenerator {
    pub(crate) fn new() -> Self {
        Self {
            last_millis: i64::MIN,
            last_tail: [0; TAIL_LEN],
        }
    }

    pub(crate) fn next(&mut self, now_millis: i64) -> String {
        // Never step backwards, or ids would stop sorting in mint order
        // when the wall clock does.
        let millis = now_millis.max(self.last_millis);
        if millis == self.last_millis {
            // Increment with carry; wrapping past all-max would need 64^12
            // ids in one millisecond.
            for slot in self.last_tail.iter_mut().rev() {
                if *slot < 63 {
                    *slot += 1;
                    break;
                }
                *slot = 0;
            }
        } else {
            let mut rng = rand::rng();
            for slot in self.last_tail.iter_mut() {
                *slot = rng.random_range(0..64u8);
            }
            self.last_millis = millis;
        }

        let mut id = String::with_capacity(8 + TAIL_LEN);
        let mut ts = millis;
        let mut prefix = [0u8; 8];
        for slot in prefix.iter_mut().rev() {
            *slot = (ts % 64) as u8;
            ts /= 64;
        }
        for index in prefix.iter().chain(self.last_tail.iter()) {
            id.push(ALPHABET[*index as usize] as char);
        }
        id
    }
}
