//! Booking references and invoice numbers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use rand::Rng;
use tracing::debug;

use super::error::BookingError;

const CODE_LEN: usize = 8;
/// Uppercase alphanumerics without the easily confused 0/O and 1/I.
const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Source of random reference codes.
pub trait CodeSource: Send + Sync {
    fn draw(&self, len: usize) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeSource for RandomCodes {
    fn draw(&self, len: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..len)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

/// Draws `PREFIX-XXXXXXXX` references, redrawing on collision.
#[derive(Clone)]
pub struct ReferenceGenerator {
    prefix: String,
    attempts: u32,
    source: Arc<dyn CodeSource>,
}

impl ReferenceGenerator {
    pub fn new(prefix: impl Into<String>, attempts: u32, source: Arc<dyn CodeSource>) -> Self {
        Self {
            prefix: prefix.into(),
            attempts: attempts.max(1),
            source,
        }
    }

    /// Must be called inside the transaction that inserts the reference, with
    /// `taken` being that transaction's view of the unique index.
    pub fn generate(&self, taken: &HashSet<String>) -> Result<String, BookingError> {
        for attempt in 1..=self.attempts {
            let reference = format!("{}-{}", self.prefix, self.source.draw(CODE_LEN));
            if !taken.contains(&reference) {
                return Ok(reference);
            }
            debug!(attempt, reference = %reference, "reference collision, redrawing");
        }
        Err(BookingError::ReferenceExhausted(self.attempts))
    }
}

/// Next `PREFIX-YYYYMMDD-NNN` invoice number for `day`.
///
/// The per-day counter row is incremented in the caller's transaction, so two
/// concurrent payments on the same day can never read the same sequence.
pub fn next_invoice_number(
    prefix: &str,
    counters: &mut HashMap<NaiveDate, u32>,
    day: NaiveDate,
) -> String {
    let seq = counters.entry(day).or_insert(0);
    *seq += 1;
    format!("{prefix}-{}-{:03}", day.format("%Y%m%d"), seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays a fixed list of codes, then repeats the last one.
    struct Scripted(Mutex<Vec<&'static str>>);

    impl CodeSource for Scripted {
        fn draw(&self, _len: usize) -> String {
            let mut codes = self.0.lock().unwrap();
            if codes.len() > 1 {
                codes.remove(0).to_string()
            } else {
                codes[0].to_string()
            }
        }
    }

    fn scripted(codes: Vec<&'static str>) -> Arc<dyn CodeSource> {
        Arc::new(Scripted(Mutex::new(codes)))
    }

    #[test]
    fn random_codes_use_alphabet() {
        let code = RandomCodes.draw(CODE_LEN);
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn reference_has_prefix() {
        let generator = ReferenceGenerator::new("BK", 3, Arc::new(RandomCodes));
        let reference = generator.generate(&HashSet::new()).unwrap();
        assert!(reference.starts_with("BK-"));
        assert_eq!(reference.len(), 3 + CODE_LEN);
    }

    #[test]
    fn collision_redraws() {
        let generator = ReferenceGenerator::new("BK", 3, scripted(vec!["AAAA", "BBBB"]));
        let taken = HashSet::from(["BK-AAAA".to_string()]);
        assert_eq!(generator.generate(&taken).unwrap(), "BK-BBBB");
    }

    #[test]
    fn persistent_collision_is_an_error() {
        let generator = ReferenceGenerator::new("BK", 4, scripted(vec!["AAAA"]));
        let taken = HashSet::from(["BK-AAAA".to_string()]);
        assert!(matches!(
            generator.generate(&taken),
            Err(BookingError::ReferenceExhausted(4))
        ));
    }

    #[test]
    fn invoice_numbers_are_sequential_per_day() {
        let mut counters = HashMap::new();
        let monday = NaiveDate::from_ymd_opt(2031, 6, 2).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2031, 6, 3).unwrap();

        assert_eq!(next_invoice_number("INV", &mut counters, monday), "INV-20310602-001");
        assert_eq!(next_invoice_number("INV", &mut counters, monday), "INV-20310602-002");
        assert_eq!(next_invoice_number("INV", &mut counters, tuesday), "INV-20310603-001");
        assert_eq!(next_invoice_number("INV", &mut counters, monday), "INV-20310602-003");
    }
}
