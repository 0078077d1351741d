//! OpenGL sharing: the description of the current GL context handed to the
//! driver, and the extension checks gating it.

/// Device extension that advertises GL sharing on this target.
#[cfg(target_os = "macos")]
pub const GL_SHARING_EXTENSION: &str = "cl_apple_gl_sharing";
#[cfg(not(target_os = "macos"))]
pub const GL_SHARING_EXTENSION: &str = "cl_khr_gl_sharing";

/// Native handles of an OpenGL context, as the window system exposes them.
///
/// Handles are stored as addresses. They are only dereferenced by the driver
/// while the GL context is current on the calling thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlShareGroup {
    /// GLX context and X display.
    Glx { context: usize, display: usize },
    /// WGL rendering context and device context.
    Wgl { context: usize, hdc: usize },
    /// CGL share group.
    Cgl { share_group: usize },
}

impl GlShareGroup {
    /// Whether this kind of share group is the one the build target uses.
    pub fn is_native(&self) -> bool {
        match self {
            GlShareGroup::Glx { .. } => cfg!(all(unix, not(target_os = "macos"))),
            GlShareGroup::Wgl { .. } => cfg!(windows),
            GlShareGroup::Cgl { .. } => cfg!(target_os = "macos"),
        }
    }
}

/// Supplies the OpenGL context current on the calling thread.
///
/// Implemented by whoever owns the rendering window; `None` means no GL
/// context is current.
pub trait GlContextSource: Send + Sync {
    fn current_share_group(&self) -> Option<GlShareGroup>;
}

impl<F> GlContextSource for F
where
    F: Fn() -> Option<GlShareGroup> + Send + Sync,
{
    fn current_share_group(&self) -> Option<GlShareGroup> {
        self()
    }
}

/// Whole-token search in a space-delimited OpenCL extension list.
pub fn extension_supported(extensions: &str, name: &str) -> bool {
    !name.is_empty() && extensions.split_whitespace().any(|ext| ext == name)
}
