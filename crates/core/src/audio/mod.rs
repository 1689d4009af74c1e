use std::cell::{Cell, RefCell, RefMut};
use std::collections::HashMap;
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::config::{AudioBackend, AudioConfig};
use crate::{PhonoscopeError, Result};

const BASE_FREQUENCY: f32 = 220.0;
const ATTACK_FRACTION: f32 = 0.1;
const NOTE_GAIN: f32 = 0.4;

/// Whether the context is producing sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Running,
    Suspended,
}

/// Short sine tone synthesized for one character.
#[derive(Debug, Clone, PartialEq)]
pub struct ToneBuffer {
    pub character: char,
    pub frequency: f32,
    pub samples: Vec<f32>,
}

/// Pitch assigned to a character: two octaves above 220 Hz, stepped by
/// semitone on the lowercased code point.
pub fn character_frequency(character: char) -> f32 {
    let lower = character.to_lowercase().next().unwrap_or(character);
    let semitone = (lower as u32 % 24) as f32;
    BASE_FREQUENCY * 2f32.powf(semitone / 12.0)
}

/// Builds the tone for `character` with a short linear attack and release.
pub fn synthesize_tone(character: char, sample_rate: u32, duration_ms: u32) -> ToneBuffer {
    let frequency = character_frequency(character);
    let len = (sample_rate as u64 * duration_ms as u64 / 1_000).max(1) as usize;
    let ramp = ((len as f32 * ATTACK_FRACTION) as usize).max(1);
    let samples = (0..len)
        .map(|index| {
            let t = index as f32 / sample_rate as f32;
            let envelope = (index.min(len - 1 - index) as f32 / ramp as f32).min(1.0);
            (2.0 * PI * frequency * t).sin() * envelope * NOTE_GAIN
        })
        .collect();
    ToneBuffer {
        character,
        frequency,
        samples,
    }
}

#[derive(Debug, Clone)]
struct Voice {
    character: char,
    started_ms: f64,
}

/// Audio-context-like device resource.
///
/// Created once per waveform state and carried across resets: opening a
/// device is expensive and browsers cap how many a page may hold.
pub struct AudioContext {
    sample_rate: u32,
    state: Cell<ContextState>,
    buffers: RefCell<HashMap<char, ToneBuffer>>,
    voices: RefCell<Vec<Voice>>,
    triggered: Cell<u64>,
    analyser: RefCell<Analyser>,
}

impl AudioContext {
    /// Fails with [`PhonoscopeError::Unsupported`] when no backend exists.
    pub fn create(config: &AudioConfig) -> Result<Self> {
        if config.backend == AudioBackend::Unavailable {
            return Err(PhonoscopeError::Unsupported(
                "audio output is not available in this environment".to_string(),
            ));
        }
        if config.sample_rate == 0 {
            return Err(PhonoscopeError::msg("audio sample rate must be positive"));
        }
        tracing::debug!(sample_rate = config.sample_rate, "audio context created");
        Ok(Self {
            sample_rate: config.sample_rate,
            state: Cell::new(ContextState::Running),
            buffers: RefCell::new(HashMap::new()),
            voices: RefCell::new(Vec::new()),
            triggered: Cell::new(0),
            analyser: RefCell::new(Analyser::new(config.fft_size)),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn state(&self) -> ContextState {
        self.state.get()
    }

    pub fn resume(&self) {
        self.state.set(ContextState::Running);
    }

    /// Silences every voice and stops accepting new ones until resumed.
    pub fn suspend(&self) {
        self.voices.borrow_mut().clear();
        self.state.set(ContextState::Suspended);
    }

    /// Drops the tone bank built for the previous word.
    pub fn clear_buffers(&self) {
        self.buffers.borrow_mut().clear();
        self.voices.borrow_mut().clear();
    }

    pub fn insert_buffer(&self, buffer: ToneBuffer) {
        self.buffers.borrow_mut().insert(buffer.character, buffer);
    }

    pub fn has_buffer(&self, character: char) -> bool {
        self.buffers.borrow().contains_key(&character)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.borrow().len()
    }

    /// Starts the character's tone at `now_ms`. Returns `false` when the
    /// context is suspended or the tone was never built.
    pub fn play(&self, character: char, now_ms: f64) -> bool {
        if self.state.get() == ContextState::Suspended || !self.has_buffer(character) {
            return false;
        }
        self.voices.borrow_mut().push(Voice {
            character,
            started_ms: now_ms,
        });
        self.triggered.set(self.triggered.get() + 1);
        true
    }

    /// Number of tones started since the context was created.
    pub fn triggered(&self) -> u64 {
        self.triggered.get()
    }

    pub fn active_voices(&self) -> usize {
        self.voices.borrow().len()
    }

    /// Mixes the `len` samples that end at `now_ms`, retiring voices that
    /// have finished.
    pub fn mix(&self, now_ms: f64, len: usize) -> Vec<f32> {
        let mut output = vec![0.0; len];
        let buffers = self.buffers.borrow();
        let rate = self.sample_rate as f64 / 1_000.0;
        let mut voices = self.voices.borrow_mut();
        voices.retain(|voice| {
            let Some(buffer) = buffers.get(&voice.character) else {
                return false;
            };
            let end = ((now_ms - voice.started_ms) * rate).max(0.0) as usize;
            let start = end.saturating_sub(len);
            for (slot, position) in (start..end).enumerate() {
                if let Some(sample) = buffer.samples.get(position) {
                    output[slot + len - (end - start)] += *sample;
                }
            }
            start < buffer.samples.len()
        });
        output
    }

    /// Frequency bands of the mix ending at `now_ms`.
    pub fn spectrum(&self, now_ms: f64, bands: usize) -> Result<Vec<f32>> {
        let size = self.analyser().size();
        let window = self.mix(now_ms, size);
        self.analyser().bands(&window, bands)
    }

    fn analyser(&self) -> RefMut<'_, Analyser> {
        self.analyser.borrow_mut()
    }
}

impl fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioContext")
            .field("sample_rate", &self.sample_rate)
            .field("state", &self.state.get())
            .field("buffers", &self.buffers.borrow().len())
            .field("voices", &self.voices.borrow().len())
            .finish()
    }
}

/// Windowed FFT magnitude analyser.
pub struct Analyser {
    fft: FftResources,
}

impl Analyser {
    pub fn new(size: usize) -> Self {
        let size = size.max(2);
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let scratch = plan.make_scratch_vec();
        let spectrum = plan.make_output_vec();
        let input = plan.make_input_vec();
        Self {
            fft: FftResources {
                size,
                plan,
                scratch,
                spectrum,
                input,
            },
        }
    }

    pub fn size(&self) -> usize {
        self.fft.size
    }

    /// Averages the magnitude spectrum into `bands` groups normalised to
    /// `[0, 1]`. Short windows are zero-padded.
    pub fn bands(&mut self, samples: &[f32], bands: usize) -> Result<Vec<f32>> {
        if bands == 0 {
            return Ok(Vec::new());
        }
        let fft = &mut self.fft;
        let size = fft.size;

        for (index, slot) in fft.input.iter_mut().enumerate() {
            let sample = samples.get(index).copied().unwrap_or(0.0);
            *slot = sample * hann_value(index, size);
        }

        fft.plan
            .process_with_scratch(&mut fft.input, &mut fft.spectrum, &mut fft.scratch)
            .map_err(|err| PhonoscopeError::msg(format!("fft failed: {err}")))?;

        let bins = fft.spectrum.len();
        let scale = 2.0 / size as f32;
        let mut output = Vec::with_capacity(bands);
        for band in 0..bands {
            let start = (band * bins / bands).min(bins - 1);
            let end = ((band + 1) * bins / bands).clamp(start + 1, bins);
            let slice = &fft.spectrum[start..end];
            let mean = slice.iter().map(|bin| bin.norm()).sum::<f32>() / slice.len() as f32;
            output.push((mean * scale).clamp(0.0, 1.0));
        }
        Ok(output)
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser").field("size", &self.fft.size).finish()
    }
}

/// Root mean square of a block.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|sample| sample * sample).sum();
    (sum / samples.len() as f32).sqrt()
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}
