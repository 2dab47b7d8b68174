use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Location, PointKey, View};

/// Program points listed by a binary's static line-number table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    points: BTreeSet<Location>,
}

impl Image {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, location: Location) {
        self.points.insert(location);
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.points.contains(location)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.points.iter()
    }

    /// The image's points projected onto `view`.
    pub fn project(&self, view: View) -> BTreeSet<PointKey> {
        self.points.iter().map(|loc| loc.project(view)).collect()
    }
}

impl FromIterator<Location> for Image {
    fn from_iter<I: IntoIterator<Item = Location>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}
