//! # Merge-Diff Classifier
//!
//! Merge-joins the original calls of one contig against the model calls for
//! the same contig (both sorted by position) and emits one verdict per
//! original position:
//!
//! | Original cursor vs model call   | Verdict                               |
//! |---------------------------------|---------------------------------------|
//! | behind                          | `S` (or `B` for a `1/2` original)     |
//! | aligned, same ALT and genotype  | `M` with the model QUAL               |
//! | aligned, ALT or genotype differ | `X` with the model QUAL               |
//! | aligned, original is `1/2`      | `B`                                   |
//! | already past the model call     | fatal `StreamOrder`                   |
//!
//! Originals sharing a position are consumed together: the first one is
//! classified and the rest are drained. Originals left after the last model
//! call are classified as if they were behind.

use std::iter::Peekable;

use tracing::debug;

use crate::data::record::VariantRecord;
use crate::data::verdict::{Verdict, VerdictKind, VerdictTally};
use crate::error::{JudgeError, Result};

struct OriginalCursor<'a, I: Iterator<Item = VariantRecord>> {
    contig: &'a str,
    inner: Peekable<I>,
}

impl<'a, I: Iterator<Item = VariantRecord>> OriginalCursor<'a, I> {
    fn peek_position(&mut self) -> Option<u64> {
        self.inner.peek().map(|r| r.position)
    }

    /// Next original record, with any same-position duplicates drained
    fn take(&mut self) -> Result<Option<VariantRecord>> {
        let Some(rec) = self.inner.next() else {
            return Ok(None);
        };
        if rec.contig != self.contig {
            return Err(JudgeError::stream_order(format!(
                "original record {}:{} found while classifying contig {}",
                rec.contig, rec.position, self.contig
            )));
        }
        while let Some(dup) = self.inner.peek() {
            if dup.position == rec.position {
                self.inner.next();
            } else if dup.position < rec.position {
                return Err(JudgeError::stream_order(format!(
                    "original calls not sorted: {}:{} follows {}:{}",
                    dup.contig, dup.position, rec.contig, rec.position
                )));
            } else {
                break;
            }
        }
        Ok(Some(rec))
    }
}

fn unmatched_verdict(original: VariantRecord) -> Verdict {
    let kind = if original.genotype.is_multiallelic() {
        VerdictKind::Multiallelic
    } else {
        VerdictKind::Spurious
    };
    Verdict {
        kind,
        original: original.genotype_field(),
        contig: original.contig,
        position: original.position,
        ref_allele: original.ref_allele,
        model: None,
        quality: None,
    }
}

fn aligned_verdict(original: VariantRecord, model: &VariantRecord) -> Verdict {
    if original.genotype.is_multiallelic() {
        return unmatched_verdict(original);
    }
    let original_field = original.genotype_field();
    let model_field = model.genotype_field();
    let kind = if original_field == model_field {
        VerdictKind::Match
    } else {
        VerdictKind::Mismatch
    };
    Verdict {
        kind,
        original: original_field,
        contig: original.contig,
        position: original.position,
        ref_allele: original.ref_allele,
        model: Some(model_field),
        quality: Some(model.quality.clone()),
    }
}

/// Classify one contig.
///
/// `emit` receives verdicts in increasing position order. Returns the tally
/// of emitted verdict kinds.
pub fn classify_contig<O, M, F>(
    contig: &str,
    originals: O,
    model: M,
    mut emit: F,
) -> Result<VerdictTally>
where
    O: IntoIterator<Item = VariantRecord>,
    M: IntoIterator<Item = VariantRecord>,
    F: FnMut(Verdict) -> Result<()>,
{
    let mut tally = VerdictTally::default();
    let mut cursor = OriginalCursor {
        contig,
        inner: originals.into_iter().peekable(),
    };
    let mut last_model: Option<u64> = None;

    for call in model {
        if call.contig != contig {
            return Err(JudgeError::stream_order(format!(
                "model call {}:{} found while classifying contig {}",
                call.contig, call.position, contig
            )));
        }
        match last_model {
            Some(prev) if call.position < prev => {
                return Err(JudgeError::stream_order(format!(
                    "model calls not sorted: {}:{} follows position {}",
                    call.contig, call.position, prev
                )));
            }
            Some(prev) if call.position == prev => {
                debug!(contig, position = call.position, "repeated model call ignored");
                continue;
            }
            _ => {}
        }
        last_model = Some(call.position);

        while cursor.peek_position().is_some_and(|p| p < call.position) {
            if let Some(original) = cursor.take()? {
                let verdict = unmatched_verdict(original);
                tally.add(verdict.kind);
                emit(verdict)?;
            }
        }

        match cursor.peek_position() {
            Some(p) if p == call.position => {
                if let Some(original) = cursor.take()? {
                    let verdict = aligned_verdict(original, &call);
                    tally.add(verdict.kind);
                    emit(verdict)?;
                }
            }
            cursor_pos => {
                return Err(JudgeError::stream_order(format!(
                    "model call {}:{} has no original record (original cursor at {})",
                    call.contig,
                    call.position,
                    cursor_pos.map_or_else(|| "end of stream".to_string(), |p| p.to_string())
                )));
            }
        }
    }

    while let Some(original) = cursor.take()? {
        let verdict = unmatched_verdict(original);
        tally.add(verdict.kind);
        emit(verdict)?;
    }

    Ok(tally)
}
