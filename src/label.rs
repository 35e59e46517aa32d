use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;

/// A boundary label as supplied by the caller.
///
/// FreeFem++ only understands small integer labels, but callers routinely
/// name boundaries with strings ("river", "bottom"). Integer labels keep
/// their own value on the wire; symbolic labels get an integer assigned by
/// [`LabelMap`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Int(i64),
    Symbolic(String),
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Label::Int(i) => write!(f, "{}", i),
            Label::Symbolic(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Label {
    fn from(i: i64) -> Label {
        Label::Int(i)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Label {
        Label::Symbolic(s.to_owned())
    }
}

impl From<String> for Label {
    fn from(s: String) -> Label {
        Label::Symbolic(s)
    }
}

/// Returns a fresh integer label: the smallest positive integer above every
/// integer label already in use.
pub fn invent_label<'a, I>(existing: I) -> Label
where
    I: IntoIterator<Item = &'a Label>,
{
    let max_int = existing
        .into_iter()
        .filter_map(|label| match label {
            Label::Int(i) => Some(*i),
            Label::Symbolic(_) => None,
        })
        .fold(0, i64::max);

    Label::Int(max_int + 1)
}

/// Bidirectional mapping between raw labels and the integer labels FreeFem++
/// requires.
///
/// The mapping is never stored on a mesh; it is re-derived from the current
/// label set whenever it is needed, and derivation is deterministic: the same
/// label set always produces the same mapping, so a mesh can be sent to the
/// solver, read back, and still match by name.
#[derive(Debug, Default)]
pub struct LabelMap {
    to_int: HashMap<Label, i64>,
    from_int: HashMap<i64, Label>,
}

impl LabelMap {
    /// Derives the mapping from a set of raw labels.
    ///
    /// Integer labels map to themselves. Symbolic labels are sorted and
    /// assigned consecutive integers starting just above the largest integer
    /// label already present (or 1 if there is none).
    pub fn derive<'a, I>(labels: I) -> LabelMap
    where
        I: IntoIterator<Item = &'a Label>,
    {
        let mut kept: BTreeSet<i64> = BTreeSet::new();
        let mut changed: BTreeSet<&str> = BTreeSet::new();

        for label in labels {
            match label {
                Label::Int(i) => {
                    kept.insert(*i);
                }
                Label::Symbolic(s) => {
                    changed.insert(s);
                }
            }
        }

        let start = kept.iter().copied().fold(0, i64::max) + 1;

        let mut map = LabelMap::default();

        for i in &kept {
            map.to_int.insert(Label::Int(*i), *i);
            map.from_int.insert(*i, Label::Int(*i));
        }

        for (offset, name) in changed.iter().enumerate() {
            let int_label = start + offset as i64;
            let label = Label::Symbolic((*name).to_owned());
            map.to_int.insert(label.clone(), int_label);
            map.from_int.insert(int_label, label);
        }

        map
    }

    pub fn to_int(&self, label: &Label) -> Option<i64> {
        self.to_int.get(label).copied()
    }

    pub fn from_int(&self, int_label: i64) -> Option<&Label> {
        self.from_int.get(&int_label)
    }

    pub fn len(&self) -> usize {
        self.to_int.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_int.is_empty()
    }
}
