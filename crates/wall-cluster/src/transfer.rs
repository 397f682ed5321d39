// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Colour/opacity transfer function with timed cross-fading.

use std::path::Path;

use wall_proto::TfPoint;

/// Seconds a cross-fade takes to complete.
pub const CROSS_FADE_SECS: f32 = 2.7;

/// Failures reading or parsing the text form.
#[derive(Debug, thiserror::Error)]
pub enum TransferFunctionError {
    /// Reading or writing the file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A token is not a number.
    #[error("token {index} ({token:?}) is not a number")]
    BadNumber {
        /// Zero-based token index.
        index: usize,
        /// Offending text.
        token: String,
    },
    /// The token count is not a multiple of five.
    #[error("{0} values do not form whole r g b a position groups")]
    Incomplete(usize),
}

#[allow(clippy::cast_precision_loss)]
const fn rgb(hex: u32, alpha: f32, position: f32) -> TfPoint {
    let r = ((hex >> 16) & 0xff) as f32 / 255.0;
    let g = ((hex >> 8) & 0xff) as f32 / 255.0;
    let b = (hex & 0xff) as f32 / 255.0;
    TfPoint::new(r, g, b, alpha, position)
}

const DEFAULT_POINTS: [TfPoint; 6] = [
    rgb(0x7C9FFF, 0.0, 0.0),
    rgb(0x122798, 0.2, 0.2),
    rgb(0x6ABC13, 0.4, 0.4),
    rgb(0xFF4649, 1.0, 0.7),
    rgb(0xFF4649, 0.2, 0.8),
    rgb(0xCCCCCC, 0.0, 0.9),
];

/// Ordered control points, optionally fading toward another set.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    points: Vec<TfPoint>,
    target: Option<Vec<TfPoint>>,
    alpha: f32,
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self::from_points(DEFAULT_POINTS.to_vec())
    }
}

impl TransferFunction {
    /// Builds a function from control points; they are sorted by position.
    pub fn from_points(points: Vec<TfPoint>) -> Self {
        let mut tf = Self {
            points: Vec::new(),
            target: None,
            alpha: 0.0,
        };
        tf.set_points(points);
        tf
    }

    /// Current control points (the fade source while cross-fading).
    pub fn points(&self) -> &[TfPoint] {
        &self.points
    }

    /// Replaces the control points. An active cross-fade keeps running.
    pub fn set_points(&mut self, mut points: Vec<TfPoint>) {
        points.sort_by(|a, b| a.position.total_cmp(&b.position));
        self.points = points;
    }

    /// Starts fading toward `target`, restarting from zero if a fade is
    /// already running.
    pub fn begin_cross_fade(&mut self, target: &[TfPoint]) {
        let mut target = target.to_vec();
        target.sort_by(|a, b| a.position.total_cmp(&b.position));
        self.target = Some(target);
        self.alpha = 0.0;
    }

    /// Advances an active cross-fade by `dt` seconds. On completion the
    /// target's points become the function's own.
    pub fn tick(&mut self, dt: f32) {
        if self.target.is_none() {
            return;
        }
        self.alpha += dt.max(0.0) / CROSS_FADE_SECS;
        if self.alpha >= 1.0 {
            if let Some(target) = self.target.take() {
                self.points = target;
            }
            self.alpha = 0.0;
        }
    }

    /// Whether a cross-fade is running.
    pub fn is_cross_fading(&self) -> bool {
        self.target.is_some()
    }

    /// Blend weight of the target in `[0, 1)`; zero when idle.
    pub fn cross_fade_alpha(&self) -> f32 {
        self.alpha
    }

    /// RGBA at a normalized position, blended with the fade target.
    ///
    /// Positions outside the control range are fully transparent black.
    pub fn sample(&self, position: f32) -> [f32; 4] {
        let own = sample_points(&self.points, position);
        match &self.target {
            Some(target) => {
                let other = sample_points(target, position);
                let t = self.alpha;
                let mut out = [0.0; 4];
                for (o, (a, b)) in out.iter_mut().zip(own.iter().zip(other.iter())) {
                    *o = (1.0 - t) * a + t * b;
                }
                out
            }
            None => own,
        }
    }

    /// Parses whitespace-separated `r g b a position` groups.
    pub fn parse(text: &str) -> Result<Vec<TfPoint>, TransferFunctionError> {
        let values = text
            .split_whitespace()
            .enumerate()
            .map(|(index, token)| {
                token
                    .parse::<f32>()
                    .map_err(|_| TransferFunctionError::BadNumber {
                        index,
                        token: token.to_owned(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if values.len() % 5 != 0 {
            return Err(TransferFunctionError::Incomplete(values.len()));
        }
        Ok(values
            .chunks_exact(5)
            .map(|v| TfPoint::new(v[0], v[1], v[2], v[3], v[4]))
            .collect())
    }

    /// Text form: one `r g b a position` line per point.
    pub fn to_text(&self) -> String {
        self.points
            .iter()
            .map(|p| format!("{} {} {} {} {}", p.r, p.g, p.b, p.a, p.position))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Loads a text file. An empty file yields the default function.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TransferFunctionError> {
        let text = std::fs::read_to_string(path)?;
        let points = Self::parse(&text)?;
        if points.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::from_points(points))
    }

    /// Writes the text form.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TransferFunctionError> {
        std::fs::write(path, self.to_text())?;
        Ok(())
    }
}

fn sample_points(points: &[TfPoint], x: f32) -> [f32; 4] {
    let rgba = |p: &TfPoint| [p.r, p.g, p.b, p.a];
    for pair in points.windows(2) {
        let (lo, hi) = (&pair[0], &pair[1]);
        if x < lo.position || x > hi.position {
            continue;
        }
        let span = hi.position - lo.position;
        if span <= f32::EPSILON {
            return rgba(hi);
        }
        let t = (x - lo.position) / span;
        let (a, b) = (rgba(lo), rgba(hi));
        return [
            (1.0 - t) * a[0] + t * b[0],
            (1.0 - t) * a[1] + t * b[1],
            (1.0 - t) * a[2] + t * b[2],
            (1.0 - t) * a[3] + t * b[3],
        ];
    }
    match points {
        [only] if (x - only.position).abs() <= f32::EPSILON => rgba(only),
        _ => [0.0; 4],
    }
}
