use std::ops::Range;

/// Contiguous chunks of `[start, start + count)`, `per_job` indices each except maybe the last.
/// The range end saturates at `usize::MAX`.
#[derive(Debug, Clone)]
pub(crate) struct ChunkRanges {
	next: usize,
	end: usize,
	per_job: usize,
}

impl Iterator for ChunkRanges {
	type Item = Range<usize>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.next >= self.end {
			return None;
		}

		let chunk = self.next..self.next.saturating_add(self.per_job).min(self.end);
		self.next = chunk.end;

		Some(chunk)
	}

	fn size_hint(&self) -> (usize, Option<usize>) {
		let remaining = (self.end - self.next).div_ceil(self.per_job);
		(remaining, Some(remaining))
	}
}

impl ExactSizeIterator for ChunkRanges {}

pub(crate) fn chunk_ranges(
	start_idx: usize,
	iteration_count: usize,
	iterations_per_job: usize,
) -> ChunkRanges {
	assert!(iterations_per_job > 0, "chunks must hold at least one index");

	ChunkRanges {
		next: start_idx,
		end: start_idx.saturating_add(iteration_count),
		per_job: iterations_per_job,
	}
}
