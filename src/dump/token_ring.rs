//! Single-token-per-thread write serialization.
//!
//! Dumper threads form a ring; each waits for its predecessor's token
//! before touching the output stream and passes the token on right after.
//! The ring keeps dump sections in slice order without a central queue.

use std::sync::{Condvar, Mutex};

struct Token {
    held: Mutex<bool>,
    cond: Condvar,
}

pub struct TokenRing {
    tokens: Vec<Token>,
}

impl TokenRing {
    /// A ring of `n ≥ 1` tokens; position 0 starts with the baton.
    pub fn new(n: usize) -> TokenRing {
        assert!(n >= 1);
        TokenRing {
            tokens: (0..n)
                .map(|i| Token {
                    held: Mutex::new(i == 0),
                    cond: Condvar::new(),
                })
                .collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Block until position `i` holds the baton.
    pub fn wait(&self, i: usize) {
        let t = &self.tokens[i];
        let mut held = t.held.lock().unwrap();
        while !*held {
            held = t.cond.wait(held).unwrap();
        }
    }

    /// Hand the baton from position `i` to its successor.
    pub fn pass(&self, i: usize) {
        {
            let mut held = self.tokens[i].held.lock().unwrap();
            debug_assert!(*held, "passing a token that is not held");
            *held = false;
        }
        let next = &self.tokens[(i + 1) % self.tokens.len()];
        let mut held = next.held.lock().unwrap();
        *held = true;
        next.cond.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn single_token_ring_cycles() {
        let ring = TokenRing::new(1);
        for _ in 0..3 {
            ring.wait(0);
            ring.pass(0);
        }
    }

    #[test]
    fn tokens_serialize_in_ring_order() {
        let n = 4;
        let rounds = 25;
        let ring = Arc::new(TokenRing::new(n));
        let log = Arc::new(Mutex::new(Vec::new()));

        let threads: Vec<_> = (0..n)
            .map(|t| {
                let ring = Arc::clone(&ring);
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    for _ in 0..rounds {
                        ring.wait(t);
                        log.lock().unwrap().push(t);
                        ring.pass(t);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        // Every baton hold happened in strict ring order.
        let log = log.lock().unwrap();
        assert_eq!(log.len(), n * rounds);
        for (i, v) in log.iter().enumerate() {
            assert_eq!(*v, i % n);
        }
    }
}
