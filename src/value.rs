//! Values stored in a bloom set
//!
//! A value knows how to turn itself into bytes, how to come back from them,
//! and which [`Filter`] describes it. Two values are the same set member iff
//! their bytes are equal.

use crate::config::Config;
use crate::filter::{BloomFilter, Filter};
use crate::{Error, Result};

/// Something that can be stored in a [`crate::BloomSet`]
pub trait Value: Sized {
    /// Serialized payload; equality of payloads is set-member identity
    fn to_bytes(&self) -> Vec<u8>;

    /// Filter describing this value, merged into every ancestor node
    fn filter(&self) -> Filter;

    /// Rebuild a value from a payload read back from the tree, along with
    /// the filter it was stored under
    fn from_bytes(bytes: &[u8], filter: &Filter) -> Result<Self>;
}

/// Bloom filter geometry used by [`Text`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterShape {
    pub bytes: usize,
    pub hashes: u8,
}

impl FilterShape {
    pub fn empty_filter(&self) -> BloomFilter {
        BloomFilter::new(self.bytes, self.hashes)
    }

    /// Query filter matching texts that contain `word`
    pub fn word_filter(&self, word: &str) -> Filter {
        let mut words = self.empty_filter();
        words.add(word.as_bytes());
        Filter::new().with(Text::WORDS, words)
    }

    /// Query filter matching texts with exactly `n` words
    pub fn count_filter(&self, n: u64) -> Filter {
        let mut count = self.empty_filter();
        count.add(&n.to_le_bytes());
        Filter::new().with(Text::COUNT, count)
    }
}

impl From<&BloomFilter> for FilterShape {
    fn from(filter: &BloomFilter) -> Self {
        FilterShape {
            bytes: filter.size_bytes(),
            hashes: filter.hashes(),
        }
    }
}

impl Default for FilterShape {
    fn default() -> Self {
        FilterShape::from(&Config::default())
    }
}

impl From<&Config> for FilterShape {
    fn from(config: &Config) -> Self {
        FilterShape {
            bytes: config.filter_bytes,
            hashes: config.filter_hashes,
        }
    }
}

/// Space-separated text, indexed by its words and its word count
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Text {
    pub content: String,
    shape: FilterShape,
}

impl Text {
    pub const WORDS: &'static str = "words";
    pub const COUNT: &'static str = "count";

    pub fn new(content: impl Into<String>) -> Self {
        Self::with_shape(content, FilterShape::default())
    }

    pub fn with_shape(content: impl Into<String>, shape: FilterShape) -> Self {
        Text {
            content: content.into(),
            shape,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}

/// Query filter for `word` with the default geometry
pub fn word_filter(word: &str) -> Filter {
    FilterShape::default().word_filter(word)
}

/// Query filter for a word count with the default geometry
pub fn count_filter(n: u64) -> Filter {
    FilterShape::default().count_filter(n)
}

impl Value for Text {
    fn to_bytes(&self) -> Vec<u8> {
        self.content.as_bytes().to_vec()
    }

    fn filter(&self) -> Filter {
        let mut words = self.shape.empty_filter();
        let mut n = 0u64;
        for word in self.content.split(' ') {
            words.add(word.as_bytes());
            n += 1;
        }

        let mut count = self.shape.empty_filter();
        count.add(&n.to_le_bytes());

        Filter::new().with(Self::WORDS, words).with(Self::COUNT, count)
    }

    /// The geometry is taken from the stored "words" filter
    fn from_bytes(bytes: &[u8], filter: &Filter) -> Result<Self> {
        let content = String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Corruption(format!("Text value is not UTF-8: {}", e)))?;
        let shape = filter
            .get(Self::WORDS)
            .map(FilterShape::from)
            .ok_or_else(|| Error::Corruption(format!("Text value '{}' has no words filter", content)))?;
        Ok(Text::with_shape(content, shape))
    }
}

impl From<&str> for Text {
    fn from(s: &str) -> Self {
        Text::new(s)
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.content)
    }
}
