#[cfg(not(feature = "std"))]
use alloc::collections::{BTreeMap, BTreeSet};
#[cfg(feature = "std")]
use std::collections::{HashMap, HashSet};

use crate::RowId;

#[cfg(feature = "std")]
pub type IdMap<V> = HashMap<RowId, V>;
#[cfg(not(feature = "std"))]
pub type IdMap<V> = BTreeMap<RowId, V>;

#[cfg(feature = "std")]
pub type IdSet = HashSet<RowId>;
#[cfg(not(feature = "std"))]
pub type IdSet = BTreeSet<RowId>;

#[cfg(feature = "std")]
pub(crate) type SegmentMap = HashMap<(Option<RowId>, alloc::string::String), RowId>;
#[cfg(not(feature = "std"))]
pub(crate) type SegmentMap = BTreeMap<(Option<RowId>, alloc::string::String), RowId>;
