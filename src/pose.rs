//! Mesh pose state and the keyboard commands that mutate it.
//!
//! A [`Pose`] is an immutable record: every frame produces a new one from the
//! previous pose and at most one [`Command`]. Nothing here touches the renderer
//! or the window, so sequences of commands can be replayed and checked in
//! isolation.
//!
//! ```
//! use overlay3d::{Command, Pose};
//!
//! let pose = Pose::default()
//!     .apply(Command::from_key('w').unwrap())
//!     .apply(Command::from_key('+').unwrap());
//!
//! assert!((pose.translation.y - 0.1).abs() < 1e-12);
//! assert!((pose.scale - 0.051).abs() < 1e-12);
//! ```

use glam::{DMat4, DVec3, Mat4};

/// Distance moved per translation key.
pub const TRANSLATION_STEP: f64 = 0.1;
/// Angle rotated per rotation key, in degrees.
pub const ROTATION_STEP_DEGREES: f64 = 5.0;
/// Scale change per `+`/`-` key.
pub const SCALE_STEP: f64 = 0.001;
/// Scale floor; decrements never go below this.
pub const MIN_SCALE: f64 = 0.01;
/// Scale of a fresh pose.
pub const INITIAL_SCALE: f64 = 0.05;

/// The escape key, as delivered to [`Command::from_key`].
pub const ESCAPE: char = '\u{1b}';

/// Principal axis for a rotation command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn rotation(self, radians: f64) -> DMat4 {
        match self {
            Axis::X => DMat4::from_rotation_x(radians),
            Axis::Y => DMat4::from_rotation_y(radians),
            Axis::Z => DMat4::from_rotation_z(radians),
        }
    }
}

/// What a single keypress asks the session to do.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Command {
    /// Add an offset to the translation.
    Translate(DVec3),
    /// Rotate about an axis, left-multiplied into the accumulated rotation.
    Rotate { axis: Axis, degrees: f64 },
    ScaleUp,
    ScaleDown,
    /// Leave the interactive loop.
    Exit,
}

impl Command {
    /// Maps a key to its command. Unmapped keys return `None` and leave the
    /// pose untouched.
    pub fn from_key(key: char) -> Option<Command> {
        let step = TRANSLATION_STEP;
        let angle = ROTATION_STEP_DEGREES;
        let command = match key {
            'w' => Command::Translate(DVec3::new(0.0, step, 0.0)),
            's' => Command::Translate(DVec3::new(0.0, -step, 0.0)),
            'a' => Command::Translate(DVec3::new(-step, 0.0, 0.0)),
            'd' => Command::Translate(DVec3::new(step, 0.0, 0.0)),
            'u' => Command::Rotate { axis: Axis::X, degrees: angle },
            'i' => Command::Rotate { axis: Axis::X, degrees: -angle },
            'j' => Command::Rotate { axis: Axis::Y, degrees: angle },
            'k' => Command::Rotate { axis: Axis::Y, degrees: -angle },
            'n' => Command::Rotate { axis: Axis::Z, degrees: angle },
            'm' => Command::Rotate { axis: Axis::Z, degrees: -angle },
            '+' => Command::ScaleUp,
            '-' => Command::ScaleDown,
            ESCAPE => Command::Exit,
            _ => return None,
        };
        Some(command)
    }
}

/// Translation, accumulated rotation and uniform scale of the mesh.
///
/// Kept in double precision so long key sequences sum the way they read;
/// [`Pose::model_matrix`] narrows to `f32` for the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub translation: DVec3,
    /// Homogeneous rotation, never renormalized.
    pub rotation: DMat4,
    pub scale: f64,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            translation: DVec3::ZERO,
            rotation: DMat4::IDENTITY,
            scale: INITIAL_SCALE,
        }
    }
}

impl Pose {
    pub fn new() -> Self {
        Self::default()
    }

    /// `translation * rotation * scale`.
    pub fn matrix(&self) -> DMat4 {
        DMat4::from_translation(self.translation)
            * self.rotation
            * DMat4::from_scale(DVec3::splat(self.scale))
    }

    /// [`Pose::matrix`] in single precision, ready for upload.
    pub fn model_matrix(&self) -> Mat4 {
        self.matrix().as_mat4()
    }

    /// Returns the pose that results from `command`. `Exit` is not a pose
    /// change and returns `self` unchanged.
    pub fn apply(self, command: Command) -> Pose {
        match command {
            Command::Translate(offset) => Pose {
                translation: self.translation + offset,
                ..self
            },
            Command::Rotate { axis, degrees } => Pose {
                rotation: axis.rotation(degrees.to_radians()) * self.rotation,
                ..self
            },
            Command::ScaleUp => Pose {
                scale: self.scale + SCALE_STEP,
                ..self
            },
            Command::ScaleDown => Pose {
                scale: (self.scale - SCALE_STEP).max(MIN_SCALE),
                ..self
            },
            Command::Exit => self,
        }
    }

    /// Applies the command for `key`, if any.
    pub fn apply_key(self, key: char) -> Pose {
        match Command::from_key(key) {
            Some(command) => self.apply(command),
            None => self,
        }
    }
}
