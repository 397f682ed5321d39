// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
use crate::cursor::Reader;
use crate::WireError;

/// Longest accepted command name in bytes.
pub const MAX_COMMAND_NAME: usize = 255;
/// Most integer or float arguments a command may carry.
pub const MAX_COMMAND_ARGS: usize = 64;

/// A named-parameter command.
///
/// Wire layout (little-endian):
/// `name_len:i32, int_count:i32, float_count:i32, name bytes, ints, floats`.
/// Names travel without a terminator; a trailing NUL from older peers is
/// stripped on decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command identifier, e.g. `color_scale`.
    pub name: String,
    /// Integer arguments in order.
    pub ints: Vec<i32>,
    /// Float arguments in order.
    pub floats: Vec<f32>,
}

impl Command {
    /// Builds a command.
    pub fn new(name: impl Into<String>, ints: Vec<i32>, floats: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            ints,
            floats,
        }
    }

    fn count_field(field: &'static str, n: usize, max: usize) -> Result<i32, WireError> {
        i32::try_from(n)
            .ok()
            .filter(|_| n <= max)
            .ok_or(WireError::InvalidCount {
                field,
                value: i64::try_from(n).unwrap_or(i64::MAX),
            })
    }

    /// Encodes the command.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let name_len = Self::count_field("name length", self.name.len(), MAX_COMMAND_NAME)?;
        let ints = Self::count_field("int count", self.ints.len(), MAX_COMMAND_ARGS)?;
        let floats = Self::count_field("float count", self.floats.len(), MAX_COMMAND_ARGS)?;
        let mut out =
            Vec::with_capacity(12 + self.name.len() + 4 * (self.ints.len() + self.floats.len()));
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(&ints.to_le_bytes());
        out.extend_from_slice(&floats.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        for v in &self.ints {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.floats {
            out.extend_from_slice(&v.to_le_bytes());
        }
        Ok(out)
    }

    /// Decodes a command; the input must hold exactly one command.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(bytes);
        let name_len = r.count("name length", MAX_COMMAND_NAME + 1)?;
        let int_count = r.count("int count", MAX_COMMAND_ARGS)?;
        let float_count = r.count("float count", MAX_COMMAND_ARGS)?;
        let raw = r.take(name_len)?;
        let raw = raw.strip_suffix(&[0]).unwrap_or(raw);
        let name = std::str::from_utf8(raw)
            .map_err(|_| WireError::InvalidUtf8)?
            .to_owned();
        let ints = (0..int_count).map(|_| r.i32()).collect::<Result<_, _>>()?;
        let floats = (0..float_count).map(|_| r.f32()).collect::<Result<_, _>>()?;
        r.finish()?;
        Ok(Self { name, ints, floats })
    }
}

/// The commands a render worker understands.
///
/// Every variant sets worker state absolutely, so applying a command twice
/// leaves the worker exactly as applying it once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WorkerCommand {
    /// Ray-march step size (`delta_t`, one float).
    DeltaT(f32),
    /// Opacity/colour scale (`color_scale`, one float).
    ColorScale(f32),
    /// Atom-ball layer on or off (`draw_balls`, one int).
    DrawBalls(bool),
    /// Volume layer on or off (`draw_volume`, one int).
    DrawVolume(bool),
    /// Background RGB (`background`, three floats).
    Background([f32; 3]),
    /// Render-resolution scale per axis (`res_scale`, two floats).
    ResScale([f32; 2]),
    /// Interlaced stereo on or off (`stereo`, one int).
    Stereo(bool),
    /// Eye separation in world units (`stereo_disparity`, one float).
    StereoDisparity(f32),
    /// Clip box on or off (`clip_box`, one int).
    ClipBox(bool),
    /// Clip box corners (`clip_box_extents`, six floats).
    ClipBoxExtents {
        /// Minimum corner.
        min: [f32; 3],
        /// Maximum corner.
        max: [f32; 3],
    },
}

impl WorkerCommand {
    /// Wire name of this command; also the coalescing key.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeltaT(_) => "delta_t",
            Self::ColorScale(_) => "color_scale",
            Self::DrawBalls(_) => "draw_balls",
            Self::DrawVolume(_) => "draw_volume",
            Self::Background(_) => "background",
            Self::ResScale(_) => "res_scale",
            Self::Stereo(_) => "stereo",
            Self::StereoDisparity(_) => "stereo_disparity",
            Self::ClipBox(_) => "clip_box",
            Self::ClipBoxExtents { .. } => "clip_box_extents",
        }
    }

    /// Converts into the generic wire form.
    pub fn to_command(&self) -> Command {
        let flag = |b: bool| vec![i32::from(b)];
        let (ints, floats) = match *self {
            Self::DeltaT(v) | Self::ColorScale(v) | Self::StereoDisparity(v) => {
                (Vec::new(), vec![v])
            }
            Self::DrawBalls(b) | Self::DrawVolume(b) | Self::Stereo(b) | Self::ClipBox(b) => {
                (flag(b), Vec::new())
            }
            Self::Background(rgb) => (Vec::new(), rgb.to_vec()),
            Self::ResScale(xy) => (Vec::new(), xy.to_vec()),
            Self::ClipBoxExtents { min, max } => {
                (Vec::new(), min.iter().chain(max.iter()).copied().collect())
            }
        };
        Command::new(self.name(), ints, floats)
    }
}

impl From<WorkerCommand> for Command {
    fn from(value: WorkerCommand) -> Self {
        value.to_command()
    }
}

fn require(cmd: &Command, ints: usize, floats: usize) -> Result<(), WireError> {
    if cmd.ints.len() < ints || cmd.floats.len() < floats {
        return Err(WireError::CommandArity {
            name: cmd.name.clone(),
            ints,
            floats,
        });
    }
    Ok(())
}

impl TryFrom<&Command> for WorkerCommand {
    type Error = WireError;

    /// Extra trailing arguments are ignored; missing ones are an error.
    fn try_from(cmd: &Command) -> Result<Self, Self::Error> {
        let f = &cmd.floats;
        let flag = || cmd.ints[0] != 0;
        Ok(match cmd.name.as_str() {
            "delta_t" => {
                require(cmd, 0, 1)?;
                Self::DeltaT(f[0])
            }
            "color_scale" => {
                require(cmd, 0, 1)?;
                Self::ColorScale(f[0])
            }
            "stereo_disparity" => {
                require(cmd, 0, 1)?;
                Self::StereoDisparity(f[0])
            }
            "draw_balls" => {
                require(cmd, 1, 0)?;
                Self::DrawBalls(flag())
            }
            "draw_volume" => {
                require(cmd, 1, 0)?;
                Self::DrawVolume(flag())
            }
            "stereo" => {
                require(cmd, 1, 0)?;
                Self::Stereo(flag())
            }
            "clip_box" => {
                require(cmd, 1, 0)?;
                Self::ClipBox(flag())
            }
            "background" => {
                require(cmd, 0, 3)?;
                Self::Background([f[0], f[1], f[2]])
            }
            "res_scale" => {
                require(cmd, 0, 2)?;
                Self::ResScale([f[0], f[1]])
            }
            "clip_box_extents" => {
                require(cmd, 0, 6)?;
                Self::ClipBoxExtents {
                    min: [f[0], f[1], f[2]],
                    max: [f[3], f[4], f[5]],
                }
            }
            other => return Err(WireError::UnknownCommand(other.to_owned())),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_documented_order() {
        let bytes = Command::new("ab", vec![7], vec![1.5]).to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &2i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &1i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &1i32.to_le_bytes());
        assert_eq!(&bytes[12..14], b"ab");
        assert_eq!(&bytes[14..18], &7i32.to_le_bytes());
        assert_eq!(&bytes[18..22], &1.5f32.to_le_bytes());
        assert_eq!(bytes.len(), 22);
    }

    #[test]
    fn trailing_nul_in_name_is_stripped() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&8i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(&0i32.to_le_bytes());
        bytes.extend_from_slice(b"clip_box\0");
        // name_len says 8 but 9 bytes follow: trailing byte rejected.
        assert_eq!(Command::from_bytes(&bytes), Err(WireError::TrailingBytes(1)));
        bytes[0..4].copy_from_slice(&9i32.to_le_bytes());
        assert_eq!(Command::from_bytes(&bytes).unwrap().name, "clip_box");
    }

    #[test]
    fn negative_counts_are_rejected() {
        let mut bytes = Command::new("x", vec![], vec![]).to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&(-1i32).to_le_bytes());
        assert_eq!(
            Command::from_bytes(&bytes),
            Err(WireError::InvalidCount {
                field: "int count",
                value: -1
            })
        );
    }

    #[test]
    fn typed_commands_survive_the_wire() {
        let all = [
            WorkerCommand::DeltaT(0.01),
            WorkerCommand::ColorScale(1.3),
            WorkerCommand::DrawBalls(false),
            WorkerCommand::DrawVolume(true),
            WorkerCommand::Background([0.1, 0.2, 0.3]),
            WorkerCommand::ResScale([0.5, 1280.0]),
            WorkerCommand::Stereo(true),
            WorkerCommand::StereoDisparity(0.13),
            WorkerCommand::ClipBox(true),
            WorkerCommand::ClipBoxExtents {
                min: [-1.0, -2.0, -3.0],
                max: [1.0, 2.0, 3.0],
            },
        ];
        for cmd in all {
            let wire = Command::from_bytes(&cmd.to_command().to_bytes().unwrap()).unwrap();
            assert_eq!(wire.name, cmd.name());
            assert_eq!(WorkerCommand::try_from(&wire).unwrap(), cmd);
        }
    }

    #[test]
    fn short_and_unknown_commands() {
        let short = Command::new("background", vec![], vec![1.0, 2.0]);
        assert!(matches!(
            WorkerCommand::try_from(&short),
            Err(WireError::CommandArity { floats: 3, .. })
        ));
        let unknown = Command::new("toggle_stereo", vec![], vec![]);
        assert_eq!(
            WorkerCommand::try_from(&unknown),
            Err(WireError::UnknownCommand("toggle_stereo".into()))
        );
    }
}
