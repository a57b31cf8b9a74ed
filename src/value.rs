//! Decoded field values.

use std::ops::Index;
use std::slice;

/// Type to represent tiff values of type `RATIONAL`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rational {
    pub n: u32,
    pub d: u32,
}

impl Rational {
    pub const fn new(n: u32, d: u32) -> Self {
        Rational { n, d }
    }
}

/// Type to represent tiff values of type `SRATIONAL`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SRational {
    pub n: i32,
    pub d: i32,
}

impl SRational {
    pub const fn new(n: i32, d: i32) -> Self {
        SRational { n, d }
    }
}

/// An immutable sequence of field values.
///
/// Most tags hold exactly one value, which is stored without a heap allocation.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueCollection<T> {
    Empty,
    One(T),
    Many(Vec<T>),
}

impl<T> ValueCollection<T> {
    pub fn len(&self) -> usize {
        match self {
            ValueCollection::Empty => 0,
            ValueCollection::One(_) => 1,
            ValueCollection::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            ValueCollection::Empty => &[],
            ValueCollection::One(value) => slice::from_ref(value),
            ValueCollection::Many(values) => values,
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }

    pub fn first(&self) -> Option<&T> {
        self.get(0)
    }

    pub fn iter(&self) -> slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            ValueCollection::Empty => Vec::new(),
            ValueCollection::One(value) => vec![value],
            ValueCollection::Many(values) => values,
        }
    }
}

impl<T> Default for ValueCollection<T> {
    fn default() -> Self {
        ValueCollection::Empty
    }
}

impl<T> From<Vec<T>> for ValueCollection<T> {
    fn from(mut values: Vec<T>) -> Self {
        match values.len() {
            0 => ValueCollection::Empty,
            1 => ValueCollection::One(values.remove(0)),
            _ => ValueCollection::Many(values),
        }
    }
}

impl<T> FromIterator<T> for ValueCollection<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut iter = iter.into_iter();
        let Some(first) = iter.next() else {
            return ValueCollection::Empty;
        };
        let Some(second) = iter.next() else {
            return ValueCollection::One(first);
        };

        let mut values = Vec::with_capacity(2 + iter.size_hint().0);
        values.push(first);
        values.push(second);
        values.extend(iter);
        ValueCollection::Many(values)
    }
}

impl<T> Index<usize> for ValueCollection<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T> AsRef<[T]> for ValueCollection<T> {
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<'a, T> IntoIterator for &'a ValueCollection<T> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> IntoIterator for ValueCollection<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}
