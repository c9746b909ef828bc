//! Drum pack assembly
//!
//! Sequences one build: transcode and concatenate the segments, validate the
//! rendered container, compute the slice plan, inject the metadata. Any
//! failure aborts the build and no bytes are returned.

use std::path::{Path, PathBuf};

use opz_drum::{
    ContainerFormat, DrumError, DrumMetadata, MAX_SLICES, PositionCodec, SLICE_PAD_SECONDS,
    SlicePlan, inject_with_codec, validate,
};
use tokio::sync::Mutex;

use crate::error::BuildError;
use crate::transcode::{SegmentLengths, TranscodeOptions, Transcoder};

/// Everything a build needs besides the segments themselves.
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    pub transcode: TranscodeOptions,
    pub metadata: DrumMetadata,
    pub format: ContainerFormat,
    pub codec: PositionCodec,
}

/// A finished pack, ready to be written to the device.
#[derive(Debug, Clone)]
pub struct DrumPack {
    pub bytes: Vec<u8>,
    pub format: ContainerFormat,
    pub plan: SlicePlan,
}

impl DrumPack {
    pub fn mime(&self) -> &'static str {
        self.format.mime()
    }

    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, &self.bytes).await
    }
}

struct TranscoderSlot {
    transcoder: Box<dyn Transcoder>,
    ready: bool,
}

/// Builds drum packs over one owned transcoder.
///
/// Builds may run concurrently; they serialize only while holding the
/// transcoder. The transcoder is brought up lazily on the first build.
pub struct PackBuilder {
    slot: Mutex<TranscoderSlot>,
}

impl PackBuilder {
    pub fn new(transcoder: Box<dyn Transcoder>) -> Self {
        Self {
            slot: Mutex::new(TranscoderSlot {
                transcoder,
                ready: false,
            }),
        }
    }

    /// Bring the transcoder up now instead of on the first build.
    pub async fn ensure_ready(&self) -> Result<(), BuildError> {
        let mut slot = self.slot.lock().await;
        if !slot.ready {
            slot.transcoder.ensure_ready().await?;
            slot.ready = true;
        }
        Ok(())
    }

    /// Shut the transcoder down. A later build brings it back up.
    pub async fn close(&self) -> Result<(), BuildError> {
        let mut slot = self.slot.lock().await;
        if slot.ready {
            slot.ready = false;
            slot.transcoder.close().await?;
        }
        Ok(())
    }

    /// Build a pack from up to [`MAX_SLICES`] source files, in slot order.
    pub async fn build(
        &self,
        segments: &[PathBuf],
        options: &PackOptions,
    ) -> Result<DrumPack, BuildError> {
        if segments.is_empty() {
            return Err(BuildError::NoSlices);
        }
        if segments.len() > MAX_SLICES {
            return Err(BuildError::TooManySlices(segments.len()));
        }

        let transcoded = {
            let mut slot = self.slot.lock().await;
            if !slot.ready {
                slot.transcoder.ensure_ready().await?;
                slot.ready = true;
            }
            slot.transcoder
                .transcode_and_concat(segments, &options.transcode)
                .await?
        };

        if transcoded.lengths.len() != segments.len() {
            return Err(BuildError::LengthMismatch {
                expected: segments.len(),
                reported: transcoded.lengths.len(),
            });
        }

        let layout = validate(&transcoded.container).map_err(DrumError::from)?;

        let plan = match &transcoded.lengths {
            SegmentLengths::Frames(frames) => SlicePlan::from_frame_counts(frames),
            SegmentLengths::Durations(durations) => {
                SlicePlan::from_durations(durations, layout.frame_count(), SLICE_PAD_SECONDS)
            }
        };

        let bytes = inject_with_codec(
            &transcoded.container,
            &plan,
            &options.metadata,
            options.format,
            &options.codec,
        )?;

        tracing::info!(
            "Built drum pack: {} slices, {} frames, {} bytes ({})",
            plan.populated_count(),
            layout.frame_count(),
            bytes.len(),
            options.format.mime()
        );

        Ok(DrumPack {
            bytes,
            format: options.format,
            plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranscodeError;
    use crate::transcode::Transcoded;
    use async_trait::async_trait;
    use opz_drum::{FormatError, read_drum_metadata, write_pcm_aiff};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        ready: AtomicUsize,
        jobs: AtomicUsize,
        closed: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    /// Renders each input as 100 frames, or as the given per-input frames,
    /// and reports either exact frames or durations.
    struct FakeTranscoder {
        counters: Arc<Counters>,
        durations: bool,
        corrupt: bool,
        rendered: Option<Vec<u64>>,
    }

    impl FakeTranscoder {
        fn new(counters: &Arc<Counters>) -> Self {
            Self {
                counters: Arc::clone(counters),
                durations: false,
                corrupt: false,
                rendered: None,
            }
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn ensure_ready(&mut self) -> Result<(), TranscodeError> {
            self.counters.ready.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn transcode_and_concat(
            &mut self,
            inputs: &[PathBuf],
            _options: &TranscodeOptions,
        ) -> Result<Transcoded, TranscodeError> {
            let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.counters.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::task::yield_now().await;

            self.counters.jobs.fetch_add(1, Ordering::SeqCst);
            let frames = self.rendered.clone().unwrap_or_else(|| vec![100; inputs.len()]);
            let total: u64 = frames.iter().sum();
            let mut container = write_pcm_aiff(&vec![0; total as usize], 44100);
            if self.corrupt {
                container[0..4].copy_from_slice(b"RIFF");
            }
            let lengths = if self.durations {
                SegmentLengths::Durations(vec![1.0; inputs.len()])
            } else {
                SegmentLengths::Frames(frames)
            };

            self.counters.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Transcoded { container, lengths })
        }

        async fn close(&mut self) -> Result<(), TranscodeError> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("slice{i}.wav"))).collect()
    }

    #[tokio::test]
    async fn test_build_produces_valid_pack() {
        let counters = Arc::new(Counters::default());
        let builder = PackBuilder::new(Box::new(FakeTranscoder::new(&counters)));

        let pack = builder.build(&paths(3), &PackOptions::default()).await.unwrap();
        assert_eq!(pack.mime(), "audio/aiff");
        assert_eq!(&pack.plan.start[..3], &[0, 100, 200]);
        assert_eq!(&pack.plan.end[..3], &[100, 200, 300]);

        let decoded = read_drum_metadata(&pack.bytes, &PositionCodec::default())
            .unwrap()
            .unwrap();
        assert_eq!(decoded.slices.len(), 3);
    }

    #[tokio::test]
    async fn test_duration_mode_uses_rendered_frames() {
        let counters = Arc::new(Counters::default());
        let mut fake = FakeTranscoder::new(&counters);
        fake.durations = true;
        let builder = PackBuilder::new(Box::new(fake));

        let options = PackOptions {
            format: ContainerFormat::Aifc,
            ..Default::default()
        };
        let pack = builder.build(&paths(2), &options).await.unwrap();
        assert_eq!(pack.mime(), "audio/x-aifc");
        // Equal durations split the 200 rendered frames evenly
        assert_eq!(&pack.plan.end[..2], &[100, 200]);
    }

    #[tokio::test]
    async fn test_uneven_rendered_frames_set_boundaries() {
        // Lengths after silence removal: the first input lost half a second
        let rendered = vec![22050 + 441, 44100 + 441, 441, 13230 + 441];
        let counters = Arc::new(Counters::default());
        let mut fake = FakeTranscoder::new(&counters);
        fake.rendered = Some(rendered.clone());
        let builder = PackBuilder::new(Box::new(fake));

        let pack = builder.build(&paths(4), &PackOptions::default()).await.unwrap();
        for (slot, &frames) in rendered.iter().enumerate() {
            assert_eq!(pack.plan.end[slot] - pack.plan.start[slot], frames, "slot {slot}");
        }
        for slot in 0..3 {
            assert_eq!(pack.plan.end[slot], pack.plan.start[slot + 1]);
        }
        assert_eq!(pack.plan.end[0], 22491);

        let decoded = read_drum_metadata(&pack.bytes, &PositionCodec::default())
            .unwrap()
            .unwrap();
        let frames: Vec<u64> = decoded.slices.iter().map(|s| s.frames()).collect();
        assert_eq!(frames, rendered);
        assert!(decoded.out_of_bounds().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_segment_counts() {
        let counters = Arc::new(Counters::default());
        let builder = PackBuilder::new(Box::new(FakeTranscoder::new(&counters)));

        assert!(matches!(
            builder.build(&[], &PackOptions::default()).await,
            Err(BuildError::NoSlices)
        ));
        assert!(matches!(
            builder.build(&paths(25), &PackOptions::default()).await,
            Err(BuildError::TooManySlices(25))
        ));
        assert_eq!(counters.ready.load(Ordering::SeqCst), 0);
        assert_eq!(counters.jobs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_render_aborts_build() {
        let counters = Arc::new(Counters::default());
        let mut fake = FakeTranscoder::new(&counters);
        fake.corrupt = true;
        let builder = PackBuilder::new(Box::new(fake));

        let result = builder.build(&paths(1), &PackOptions::default()).await;
        assert!(matches!(
            result,
            Err(BuildError::Drum(DrumError::Format(FormatError::NotForm)))
        ));
    }

    #[tokio::test]
    async fn test_lazy_ready_and_close() {
        let counters = Arc::new(Counters::default());
        let builder = PackBuilder::new(Box::new(FakeTranscoder::new(&counters)));
        assert_eq!(counters.ready.load(Ordering::SeqCst), 0);

        builder.build(&paths(1), &PackOptions::default()).await.unwrap();
        builder.build(&paths(1), &PackOptions::default()).await.unwrap();
        assert_eq!(counters.ready.load(Ordering::SeqCst), 1);

        builder.close().await.unwrap();
        builder.close().await.unwrap();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

        builder.ensure_ready().await.unwrap();
        assert_eq!(counters.ready.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_builds_serialize_on_transcoder() {
        let counters = Arc::new(Counters::default());
        let builder = Arc::new(PackBuilder::new(Box::new(FakeTranscoder::new(&counters))));

        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let builder = Arc::clone(&builder);
                tokio::spawn(async move { builder.build(&paths(n), &PackOptions::default()).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(counters.jobs.load(Ordering::SeqCst), 8);
        assert_eq!(counters.ready.load(Ordering::SeqCst), 1);
        assert_eq!(counters.max_active.load(Ordering::SeqCst), 1);
    }
}
