pub use crate::config::*;

/// Textual markers left behind when a missing cell gets stringified.
/// A name equal to one of them (after trimming) is not a participant.
pub const NULL_NAME_MARKERS: [&str; 3] = ["", "nan", "None"];

/// Returns the trimmed name if it designates a real participant.
pub fn valid_name(raw: &str) -> Option<&str> {
    let name = raw.trim();
    if NULL_NAME_MARKERS.contains(&name) {
        None
    } else {
        Some(name)
    }
}

/// A builder for assembling a roster row by row.
///
/// Rows with an invalid name are skipped, so readers can push every row they find.
///
/// ```
/// use fair_draw::builder::RosterBuilder;
/// # use fair_draw::DrawErrors;
///
/// let mut builder = RosterBuilder::new();
/// builder.add(" Anna ", 0);
/// builder.add("nan", 3);
/// builder.add("Bob", 1);
///
/// let roster = builder.build()?;
/// assert_eq!(roster.len(), 2);
/// assert_eq!(roster.participants()[0].name, "Anna");
/// # Ok::<(), DrawErrors>(())
/// ```
#[derive(Debug, Default)]
pub struct RosterBuilder {
    participants: Vec<Participant>,
    skipped: usize,
}

impl RosterBuilder {
    pub fn new() -> RosterBuilder {
        RosterBuilder::default()
    }

    /// Adds a row. Returns false when the name was rejected.
    pub fn add(&mut self, name: &str, counter: u32) -> bool {
        match valid_name(name) {
            Some(n) => {
                self.participants.push(Participant {
                    name: n.to_string(),
                    counter,
                });
                true
            }
            None => {
                self.skipped += 1;
                false
            }
        }
    }

    /// Number of rows rejected so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn build(self) -> Result<Roster, DrawErrors> {
        Roster::new(self.participants)
    }
}
