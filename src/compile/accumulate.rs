use std::time::Instant;

use super::buffer::SpectrumBuffer;
use crate::catalog::CatalogRecord;
use crate::config::SpectrumMode;
use crate::error::{Error, Result};
use crate::schema::{self, err_name, DERIVED, LABELS, SENTINEL};
use crate::spectra::{Fetched, SpectrumNormalizer};

/// Appends the spectra and labels of accepted stars to a [`SpectrumBuffer`].
pub struct Accumulator<'a> {
    normalizer: SpectrumNormalizer<'a>,
    mode: SpectrumMode,
    buffer: SpectrumBuffer,
    skipped: usize,
}

impl<'a> Accumulator<'a> {
    /// Accumulate into a fixed buffer of `capacity` rows.
    pub fn new(normalizer: SpectrumNormalizer<'a>, mode: SpectrumMode, capacity: usize) -> Self {
        let pixels = normalizer.layout().total_pixels();
        Self::with_buffer(normalizer, mode, SpectrumBuffer::new(capacity, pixels))
    }

    pub fn with_buffer(
        normalizer: SpectrumNormalizer<'a>,
        mode: SpectrumMode,
        buffer: SpectrumBuffer,
    ) -> Self {
        Self {
            normalizer,
            mode,
            buffer,
            skipped: 0,
        }
    }

    pub fn buffer(&self) -> &SpectrumBuffer {
        &self.buffer
    }

    /// Stars dropped because their spectra were unavailable.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn into_buffer(self) -> SpectrumBuffer {
        self.buffer
    }

    /// Push every accepted catalog row, in order.
    pub fn run(
        &mut self,
        records: &[CatalogRecord],
        accepted: &[usize],
        progress_every: usize,
    ) -> Result<()> {
        let start = Instant::now();
        for (counter, &index) in accepted.iter().enumerate() {
            if counter % progress_every.max(1) == 0 {
                log::info!(
                    "completed {counter} of {}, {:.3} seconds elapsed",
                    accepted.len(),
                    start.elapsed().as_secs_f64()
                );
            }
            self.push_record(index, &records[index])?;
        }
        log::info!(
            "accumulated {} spectra from {} stars ({} skipped)",
            self.buffer.cursor(),
            accepted.len() - self.skipped,
            self.skipped
        );
        Ok(())
    }

    /// Append one star. Returns the number of rows written, zero when the
    /// star's spectra are unavailable.
    pub fn push_record(&mut self, catalog_index: usize, record: &CatalogRecord) -> Result<usize> {
        let id = record.apogee_id.as_str();
        let fetched = match self.mode {
            SpectrumMode::Combined => self.normalizer.combined(record.location_id, id)?,
            SpectrumMode::Visits => self.normalizer.visits(record.location_id, id)?,
        };
        let spectra = match fetched {
            Fetched::Ready(spectra) => spectra,
            Fetched::Unavailable(why) => {
                log::warn!("skipping {id}: {why}");
                self.skipped += 1;
                return Ok(0);
            }
        };

        let mut nvisits = 1;
        if self.mode == SpectrumMode::Visits {
            nvisits = spectra.nvisits;
            if nvisits > 1 {
                // The combined row precedes the visits.
                nvisits += 1;
            }
        }
        if spectra.flux.nrows() != nvisits {
            return Err(Error::Schema(format!(
                "{id}: expected {nvisits} spectra, normalizer returned {}",
                spectra.flux.nrows()
            )));
        }

        let rows = self.buffer.claim(nvisits)?;
        self.buffer
            .set_spectra(rows.clone(), &spectra.flux, &spectra.error)?;
        self.buffer.set_visit_flags(rows.clone());
        self.buffer
            .set_position(rows.clone(), catalog_index, record.ra, record.dec);

        self.buffer.fill(schema::SNR, rows.clone(), record.snr)?;
        self.buffer.fill(schema::KMAG, rows.clone(), record.k_mag)?;
        for label in &LABELS {
            self.buffer.fill(label.name, rows.clone(), label.value(record))?;
            self.buffer
                .fill(&err_name(label.name), rows.clone(), label.uncertainty(record))?;
        }
        for derived in DERIVED {
            self.buffer.fill(derived, rows.clone(), SENTINEL)?;
            self.buffer.fill(&err_name(derived), rows.clone(), SENTINEL)?;
        }
        Ok(nvisits)
    }
}
