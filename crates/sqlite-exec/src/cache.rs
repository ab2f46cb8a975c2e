//! Bounded least-recently-used cache keyed by a hash of SQL text

use indexmap::IndexMap;
use tracing::trace;

/// Default number of prepared statements kept per connection
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 128;

/// Fixed-width lookup key derived from SQL text
pub type CacheKey = u32;

/// Function deriving a [`CacheKey`] from SQL text
pub type KeyHasher = fn(&str) -> CacheKey;

/// Default [`KeyHasher`]: the first four bytes of the BLAKE3 digest of `sql`.
pub fn sql_hash(sql: &str) -> CacheKey {
   let digest = blake3::hash(sql.as_bytes());
   let bytes = digest.as_bytes();
   u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[derive(Debug)]
struct Entry<V> {
   sql: Box<str>,
   value: V,
}

/// Result of [`StatementCache::get_or_try_insert_with`].
#[derive(Debug)]
pub struct Cached<'a, V> {
   /// The cached value for the requested SQL text
   pub value: &'a mut V,
   /// True when the value was already cached
   pub hit: bool,
   /// Values pushed out of the cache by this insert, oldest first. The caller
   /// owns them and is responsible for releasing them.
   pub evicted: Vec<V>,
}

/// Bounded map from SQL text to a prepared value.
///
/// Entries are ordered from least to most recently used. Keys are a 32-bit hash
/// of the SQL text, but every entry keeps its text and a lookup only hits when
/// the text matches exactly, so two statements whose hashes collide are never
/// confused: the newer one displaces the older.
///
/// The cache never disposes of values itself. Anything it drops out, whether
/// through capacity eviction, a hash collision, or [`drain`](Self::drain), is
/// handed back to the caller.
#[derive(Debug)]
pub struct StatementCache<V> {
   entries: IndexMap<CacheKey, Entry<V>>,
   capacity: usize,
   hasher: KeyHasher,
   evictions: u64,
}

impl<V> StatementCache<V> {
   /// Create a cache holding at most `capacity` entries (at least one).
   pub fn new(capacity: usize) -> Self {
      Self::with_hasher(capacity, sql_hash)
   }

   pub fn with_hasher(capacity: usize, hasher: KeyHasher) -> Self {
      Self {
         entries: IndexMap::new(),
         capacity: capacity.max(1),
         hasher,
         evictions: 0,
      }
   }

   /// Look up `sql`, preparing and inserting it with `prepare` on a miss.
   ///
   /// A hit marks the entry most recently used. A miss that fills the cache
   /// evicts the least recently used entry; a miss whose key collides with a
   /// different SQL text replaces that entry. Displaced values come back in
   /// [`Cached::evicted`]. A failing `prepare` leaves the cache untouched.
   pub fn get_or_try_insert_with<E, F>(&mut self, sql: &str, prepare: F) -> Result<Cached<'_, V>, E>
   where
      F: FnOnce() -> Result<V, E>,
   {
      let key = (self.hasher)(sql);

      if let Some(index) = self.entries.get_index_of(&key)
         && *self.entries[index].sql == *sql
      {
         let last = self.entries.len() - 1;
         self.entries.move_index(index, last);
         return Ok(Cached {
            value: &mut self.entries[last].value,
            hit: true,
            evicted: Vec::new(),
         });
      }

      let value = prepare()?;
      let mut evicted = Vec::new();

      if let Some(displaced) = self.entries.shift_remove(&key) {
         trace!(key, sql = %displaced.sql, "Cache key collision; replacing entry");
         evicted.push(displaced.value);
      }

      while self.entries.len() >= self.capacity {
         match self.entries.shift_remove_index(0) {
            Some((_, oldest)) => {
               trace!(sql = %oldest.sql, "Evicting least recently used entry");
               evicted.push(oldest.value);
            }
            None => break,
         }
      }

      self.evictions += evicted.len() as u64;

      let (index, _) = self.entries.insert_full(
         key,
         Entry {
            sql: sql.into(),
            value,
         },
      );

      Ok(Cached {
         value: &mut self.entries[index].value,
         hit: false,
         evicted,
      })
   }

   /// True when `sql` itself is cached. Does not affect recency.
   pub fn contains(&self, sql: &str) -> bool {
      self
         .entries
         .get(&(self.hasher)(sql))
         .is_some_and(|entry| *entry.sql == *sql)
   }

   /// The value cached for `sql`, if any. Does not affect recency.
   pub fn get(&self, sql: &str) -> Option<&V> {
      self
         .entries
         .get(&(self.hasher)(sql))
         .filter(|entry| *entry.sql == *sql)
         .map(|entry| &entry.value)
   }

   /// Remove the entry for `sql`, returning its value. Not counted as an eviction.
   pub fn remove(&mut self, sql: &str) -> Option<V> {
      let key = (self.hasher)(sql);
      if !self.contains(sql) {
         return None;
      }
      self.entries.shift_remove(&key).map(|entry| entry.value)
   }

   /// Remove every entry, returning the values from least to most recently used.
   pub fn drain(&mut self) -> Vec<V> {
      self.entries.drain(..).map(|(_, entry)| entry.value).collect()
   }

   pub fn len(&self) -> usize {
      self.entries.len()
   }

   pub fn is_empty(&self) -> bool {
      self.entries.is_empty()
   }

   pub fn capacity(&self) -> usize {
      self.capacity
   }

   /// Total number of values displaced since the cache was created
   pub fn evictions(&self) -> u64 {
      self.evictions
   }
}
