/// Log sequence number stamped on pages by the (external) log manager.
///
/// The storage core only stores and round-trips this value; assigning it is
/// the log manager's job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Lsn(pub u32);

impl Lsn {
    pub const INVALID: Self = Lsn(u32::MAX);

    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

/// Record identifier: which page a tuple lives on and its slot within it.
///
/// This is the canonical value type stored in index entries. Total size:
/// 8 bytes on disk (page id + slot, both 32-bit).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub page_id: i32,
    pub slot: u32,
}

impl Rid {
    pub const INVALID: Self = Self {
        page_id: -1,
        slot: u32::MAX,
    };

    pub const fn new(page_id: i32, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub const fn is_valid(&self) -> bool {
        self.page_id >= 0
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_id, self.slot)
    }
}
