/// Renderer configuration, extents and device description

use crate::renderer::TextureFormat;

/// Default number of frames recorded ahead of the GPU
pub const FRAMES_IN_FLIGHT: usize = 4;

/// Validation message severity forwarded to the engine logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    ErrorsOnly,
    ErrorsAndWarnings,
    All,
}

/// Which validation message types are forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: false,
        }
    }
}

/// Validation messages counted since the renderer was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Renderer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable validation layers (requires the `vulkan-validation` feature)
    pub enable_validation: bool,
    pub app_name: String,
    /// (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Number of frame slots, each with its own fence and command list
    pub frames_in_flight: usize,
    /// Attachments with this format become depth attachments
    pub depth_format: TextureFormat,
    /// Size of `ExtentClass::ShadowMap` attachments
    pub shadowmap_extent: Extent2D,
    pub debug_severity: DebugSeverity,
    pub debug_message_filter: DebugMessageFilter,
    /// Count validation messages per severity
    pub enable_validation_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "Rendergraph Application".to_string(),
            app_version: (1, 0, 0),
            frames_in_flight: FRAMES_IN_FLIGHT,
            depth_format: TextureFormat::D32_FLOAT,
            shadowmap_extent: Extent2D { width: 2048, height: 2048 },
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_message_filter: DebugMessageFilter::default(),
            enable_validation_stats: false,
        }
    }
}

// ===== EXTENTS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

/// Size class of a node's attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtentClass {
    /// Follows the swapchain
    Presentation,
    ShadowMap,
}

/// Current size of every extent class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extents {
    pub presentation: Extent2D,
    pub shadow_map: Extent2D,
}

impl Extents {
    pub fn new(presentation: Extent2D, config: &Config) -> Self {
        Self {
            presentation,
            shadow_map: config.shadowmap_extent,
        }
    }

    pub fn get(&self, class: ExtentClass) -> Extent2D {
        match class {
            ExtentClass::Presentation => self.presentation,
            ExtentClass::ShadowMap => self.shadow_map,
        }
    }

    /// Same table with the presentation entry replaced
    pub fn with_presentation(self, presentation: Extent2D) -> Self {
        Self { presentation, ..self }
    }
}

// ===== DEVICE INFO =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
    Cpu,
    Other,
}

/// Properties of the selected device, queried once at renderer creation
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub device_type: DeviceType,
    /// (major, minor, patch)
    pub api_version: (u32, u32, u32),
    pub depth_format: TextureFormat,
    /// Swapchain image format
    pub presentation_format: TextureFormat,
    pub graphics_queue_family: u32,
    pub transfer_queue_family: u32,
    /// Nanoseconds per timestamp tick
    pub timestamp_period: f32,
}

impl DeviceInfo {
    pub fn is_depth_format(&self, format: TextureFormat) -> bool {
        format == self.depth_format
    }
}
