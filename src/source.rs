//! The interface feature detection uses to read spectra from an LC-MS run.
//!
//! Reading any particular file format is left to the caller; anything that can
//! report how many spectra it holds and produce each one by index can drive the
//! pipeline.
use std::collections::VecDeque;
use std::io;

use thiserror::Error;

use crate::spectrum::SpectrumData;

/// Errors that may occur when reading a spectrum from a [`SpectrumRunSource`]
#[derive(Debug, Error)]
pub enum SpectrumAccessError {
    /// An error resolving a spectrum by it's index
    #[error("The requested spectrum index {0} was not found")]
    SpectrumIndexNotFound(usize),
    /// An I/O error prevented reading the spectrum, even if it could be found.
    #[error("I/O error occurred while reading: {0:?}")]
    IOError(#[source] Option<io::Error>),
}

impl From<SpectrumAccessError> for io::Error {
    fn from(value: SpectrumAccessError) -> Self {
        let s = value.to_string();
        match value {
            SpectrumAccessError::SpectrumIndexNotFound(_) => {
                io::Error::new(io::ErrorKind::NotFound, s)
            }
            SpectrumAccessError::IOError(e) => match e {
                Some(e) => e,
                None => io::Error::new(io::ErrorKind::Other, s),
            },
        }
    }
}

impl From<io::Error> for SpectrumAccessError {
    fn from(value: io::Error) -> Self {
        Self::IOError(Some(value))
    }
}

/// A base trait defining the behaviors of a source of spectra for one run.
///
/// Spectra are expected to be stored in ascending retention time order by index.
/// The feature detector verifies this and reports an ordering error otherwise.
pub trait SpectrumRunSource {
    /// Retrieve the number of spectra in the run
    fn spectrum_count(&self) -> usize;

    /// Retrieve a spectrum by it's integer index
    fn spectrum(&mut self, index: usize) -> Result<SpectrumData, SpectrumAccessError>;

    fn is_empty(&self) -> bool {
        self.spectrum_count() == 0
    }

    /// Open a new iterator over all spectra in index order
    fn iter(&mut self) -> SpectrumRunIter<'_, Self>
    where
        Self: Sized,
    {
        SpectrumRunIter::new(self)
    }
}

/// An iterator over a [`SpectrumRunSource`] that yields spectra in index order
pub struct SpectrumRunIter<'a, S: SpectrumRunSource> {
    source: &'a mut S,
    index: usize,
}

impl<'a, S: SpectrumRunSource> SpectrumRunIter<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self { source, index: 0 }
    }
}

impl<S: SpectrumRunSource> Iterator for SpectrumRunIter<'_, S> {
    type Item = Result<SpectrumData, SpectrumAccessError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.source.spectrum_count() {
            let idx = self.index;
            self.index += 1;
            Some(self.source.spectrum(idx))
        } else {
            None
        }
    }
}

/// A collection of spectra held in memory but providing an interface
/// identical to a data file. This structure owns its data, so in order
/// to yield ownership for [`SpectrumRunSource`], they are cloned
#[derive(Debug, Default, Clone)]
pub struct MemoryRunSource {
    spectra: VecDeque<SpectrumData>,
}

impl MemoryRunSource {
    pub fn new(spectra: VecDeque<SpectrumData>) -> Self {
        Self { spectra }
    }

    pub fn push(&mut self, spectrum: SpectrumData) {
        self.spectra.push_back(spectrum);
    }
}

impl SpectrumRunSource for MemoryRunSource {
    fn spectrum_count(&self) -> usize {
        self.spectra.len()
    }

    fn spectrum(&mut self, index: usize) -> Result<SpectrumData, SpectrumAccessError> {
        self.spectra
            .get(index)
            .cloned()
            .ok_or(SpectrumAccessError::SpectrumIndexNotFound(index))
    }
}

impl From<VecDeque<SpectrumData>> for MemoryRunSource {
    fn from(value: VecDeque<SpectrumData>) -> Self {
        Self::new(value)
    }
}

impl From<Vec<SpectrumData>> for MemoryRunSource {
    fn from(value: Vec<SpectrumData>) -> Self {
        Self::new(value.into())
    }
}

impl FromIterator<SpectrumData> for MemoryRunSource {
    fn from_iter<T: IntoIterator<Item = SpectrumData>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
