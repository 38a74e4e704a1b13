/// Bundled placeholder covers, in the order they are handed out.
pub const DEFAULT_COVER_POOL: [&str; 20] = [
    "a.png", "b.png", "c.png", "d.png", "e.png", "f.png", "g.png", "h.png", "j.png", "k.png",
    "l.png", "m.png", "n.png", "o.png", "p.png", "q.png", "r.png", "s.png", "t.png", "u.png",
];

pub const COVERS_URL_PREFIX: &str = "/covers/";

/// Picks a placeholder cover for the `index`-th track that needs one.
pub trait CoverAllocator {
    fn cover_for(&self, index: usize) -> Option<String>;
}

impl<F> CoverAllocator for F
where
    F: Fn(usize) -> Option<String>,
{
    fn cover_for(&self, index: usize) -> Option<String> {
        self(index)
    }
}

/// Round-robin over a fixed, ordered list of file names.
#[derive(Clone, Debug)]
pub struct RoundRobinCovers {
    pool: Vec<String>,
    prefix: String,
}

impl RoundRobinCovers {
    pub fn new<I, S>(pool: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pool: pool.into_iter().map(Into::into).collect(),
            prefix: COVERS_URL_PREFIX.to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

impl Default for RoundRobinCovers {
    fn default() -> Self {
        Self::new(DEFAULT_COVER_POOL)
    }
}

impl CoverAllocator for RoundRobinCovers {
    fn cover_for(&self, index: usize) -> Option<String> {
        if self.pool.is_empty() {
            return None;
        }
        Some(format!("{}{}", self.prefix, self.pool[index % self.pool.len()]))
    }
}

/// Hands out covers in sequence, advancing only when a cover was missing.
pub struct CoverCursor<'a> {
    covers: &'a dyn CoverAllocator,
    next: usize,
}

impl<'a> CoverCursor<'a> {
    pub fn new(covers: &'a dyn CoverAllocator) -> Self {
        Self { covers, next: 0 }
    }

    pub fn fill(&mut self, cover: &mut Option<String>) {
        if crate::track::is_blank(cover) {
            *cover = self.covers.cover_for(self.next);
            self.next += 1;
        }
    }
}
