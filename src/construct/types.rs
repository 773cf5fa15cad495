#[cfg(feature = "mpi")]
use mpi::traits::Equivalence;

/// Newtype to represent vertex ids, both external and renumbered
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "mpi", derive(Equivalence))]
pub struct VertexID(pub u64);

impl From<u64> for VertexID {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<u32> for VertexID {
    fn from(value: u32) -> Self {
        Self(value as u64)
    }
}

impl std::fmt::Display for VertexID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// An edge as handed to the pipeline by the caller, or read back out of a
/// [`GraphView`](crate::GraphView).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Edge {
    pub src: VertexID,
    pub dst: VertexID,
    pub weight: Option<f64>,
    pub id: Option<u64>,
    pub kind: Option<i32>,
}

impl Edge {
    pub fn new(src: impl Into<VertexID>, dst: impl Into<VertexID>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            ..Default::default()
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_kind(mut self, kind: i32) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn reversed(self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
            ..self
        }
    }
}

impl From<(u64, u64)> for Edge {
    fn from(value: (u64, u64)) -> Self {
        Self::new(value.0, value.1)
    }
}

impl From<(u64, u64, f64)> for Edge {
    fn from(value: (u64, u64, f64)) -> Self {
        Self::new(value.0, value.1).with_weight(value.2)
    }
}

/// Flat, fixed-size form of an [`Edge`] that travels through collectives.
///
/// Optional attributes are encoded with presence bits in `flags`. The origin
/// pair identifies where and in which order the edge entered the pipeline and
/// is the tie-break used by [`DedupePolicy::KeepFirst`](crate::DedupePolicy).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "mpi", derive(Equivalence))]
pub struct EdgeRecord {
    pub src: u64,
    pub dst: u64,
    pub weight: f64,
    pub edge_id: u64,
    pub edge_type: i32,
    pub flags: u8,
    pub origin_rank: u32,
    pub origin_seq: u64,
}

impl EdgeRecord {
    pub const HAS_WEIGHT: u8 = 0b001;
    pub const HAS_ID: u8 = 0b010;
    pub const HAS_TYPE: u8 = 0b100;

    pub fn from_edge(edge: &Edge, origin_rank: usize, origin_seq: u64) -> Self {
        let mut flags = 0;
        if edge.weight.is_some() {
            flags |= Self::HAS_WEIGHT;
        }
        if edge.id.is_some() {
            flags |= Self::HAS_ID;
        }
        if edge.kind.is_some() {
            flags |= Self::HAS_TYPE;
        }

        Self {
            src: edge.src.0,
            dst: edge.dst.0,
            weight: edge.weight.unwrap_or_default(),
            edge_id: edge.id.unwrap_or_default(),
            edge_type: edge.kind.unwrap_or_default(),
            flags,
            origin_rank: origin_rank as u32,
            origin_seq,
        }
    }

    pub fn to_edge(&self) -> Edge {
        Edge {
            src: VertexID(self.src),
            dst: VertexID(self.dst),
            weight: self.weight(),
            id: self.edge_id(),
            kind: self.edge_type(),
        }
    }

    #[inline]
    pub fn weight(&self) -> Option<f64> {
        (self.flags & Self::HAS_WEIGHT != 0).then_some(self.weight)
    }

    #[inline]
    pub fn edge_id(&self) -> Option<u64> {
        (self.flags & Self::HAS_ID != 0).then_some(self.edge_id)
    }

    #[inline]
    pub fn edge_type(&self) -> Option<i32> {
        (self.flags & Self::HAS_TYPE != 0).then_some(self.edge_type)
    }

    pub fn set_weight(&mut self, weight: Option<f64>) {
        match weight {
            Some(w) => {
                self.weight = w;
                self.flags |= Self::HAS_WEIGHT;
            }
            None => {
                self.weight = 0.0;
                self.flags &= !Self::HAS_WEIGHT;
            }
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
            ..*self
        }
    }

    #[inline]
    pub fn is_self_loop(&self) -> bool {
        self.src == self.dst
    }

    /// The endpoint the edge is partitioned and grouped by
    #[inline]
    pub fn major(&self, transposed: bool) -> u64 {
        if transposed {
            self.dst
        } else {
            self.src
        }
    }

    #[inline]
    pub fn minor(&self, transposed: bool) -> u64 {
        if transposed {
            self.src
        } else {
            self.dst
        }
    }

    /// Ordering key: endpoints first, then rank of origin, then arrival order
    #[inline]
    pub fn sort_key(&self, transposed: bool) -> (u64, u64, u32, u64) {
        (
            self.major(transposed),
            self.minor(transposed),
            self.origin_rank,
            self.origin_seq,
        )
    }
}

/// A vertex id together with a (partial) degree, exchanged while renumbering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "mpi", derive(Equivalence))]
pub struct VertexDegree {
    pub vertex: u64,
    pub degree: u64,
}

/// Answer to an id lookup; `id` is meaningful only when `found` is set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "mpi", derive(Equivalence))]
pub struct LookupReply {
    pub id: u64,
    pub found: u8,
}

impl LookupReply {
    pub fn found(id: VertexID) -> Self {
        Self { id: id.0, found: 1 }
    }

    pub fn missing() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<VertexID> {
        (self.found != 0).then_some(VertexID(self.id))
    }
}
