//! Composite priority keys.

use std::fmt;

/// Hierarchical priority, compared lexicographically like a tuple: lower
/// values run first and a strict prefix sorts before its extensions.
///
/// A task typically claims a rank and gives each of its jobs a sub-rank:
///
/// ```
/// use grab_core::queue::Priority;
///
/// let task = Priority::new([1]);
/// assert!(task.child(0) < task.child(1));
/// assert!(task.child(9) < Priority::new([2]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(Vec<i64>);

impl Priority {
    pub fn new(parts: impl IntoIterator<Item = i64>) -> Self {
        Self(parts.into_iter().collect())
    }

    /// This priority extended by one sub-rank.
    pub fn child(&self, sub: i64) -> Self {
        let mut parts = self.0.clone();
        parts.push(sub);
        Self(parts)
    }

    pub fn parts(&self) -> &[i64] {
        &self.0
    }
}

// Unsuffixed integer literals default to `i32`, so both widths convert.
macro_rules! priority_from_ints {
    ($($t:ty),*) => {$(
        impl From<$t> for Priority {
            fn from(p: $t) -> Self {
                Self(vec![i64::from(p)])
            }
        }

        impl From<($t, $t)> for Priority {
            fn from((a, b): ($t, $t)) -> Self {
                Self(vec![i64::from(a), i64::from(b)])
            }
        }

        impl From<($t, $t, $t)> for Priority {
            fn from((a, b, c): ($t, $t, $t)) -> Self {
                Self(vec![i64::from(a), i64::from(b), i64::from(c)])
            }
        }

        impl<const N: usize> From<[$t; N]> for Priority {
            fn from(parts: [$t; N]) -> Self {
                Self(parts.iter().map(|p| i64::from(*p)).collect())
            }
        }
    )*};
}

priority_from_ints!(i32, i64);

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ")")
    }
}
