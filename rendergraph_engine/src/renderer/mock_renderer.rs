/// Mock renderer for unit tests (no GPU required)
///
/// Every object records what was asked of it as plain strings so tests can
/// assert on creation order and recorded commands.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use winit::window::Window;

use crate::renderer::{
    AcquireOutcome, Buffer, BufferDesc, ClearValue, CommandList, DescriptorAllocator,
    DescriptorSet, DescriptorSetLayoutDesc, DescriptorSetType, DeviceInfo, DeviceType,
    Extent2D, Framebuffer, FramebufferDesc, GraphicsPipelineDesc, ImageBarrier, IndexType,
    Pipeline, PipelineLayoutInfo, PresentOutcome, Rect2D, RenderPass, RenderPassDesc, Renderer,
    SampledImageWrite, Shader, ShaderDesc, ShaderStageLayout, Swapchain, Texture,
    TextureDesc, TextureFormat, TextureInfo, TextureUsage, Viewport,
};
use crate::error::Result;
use crate::engine_bail;

pub const MOCK_DEPTH_FORMAT: TextureFormat = TextureFormat::D32_FLOAT;
pub const MOCK_PRESENTATION_FORMAT: TextureFormat = TextureFormat::B8G8R8A8_SRGB;

pub fn mock_device_info() -> DeviceInfo {
    DeviceInfo {
        name: "Mock GPU".to_string(),
        device_type: DeviceType::Other,
        api_version: (1, 3, 0),
        depth_format: MOCK_DEPTH_FORMAT,
        presentation_format: MOCK_PRESENTATION_FORMAT,
        graphics_queue_family: 0,
        transfer_queue_family: 0,
        timestamp_period: 1.0,
    }
}

// ============================================================================
// Mock Buffer
// ============================================================================

#[derive(Debug)]
pub struct MockBuffer {
    pub name: String,
    pub data: Mutex<Vec<u8>>,
}

impl MockBuffer {
    pub fn new(size: u64, name: &str) -> Self {
        Self {
            name: name.to_string(),
            data: Mutex::new(vec![0; size as usize]),
        }
    }
}

impl Buffer for MockBuffer {
    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut storage = self.data.lock().unwrap();
        let start = offset as usize;
        if start + data.len() > storage.len() {
            engine_bail!("rendergraph::mock", "update of {} bytes at {} overflows '{}'", data.len(), offset, self.name);
        }
        storage[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.lock().unwrap().len() as u64
    }
}

// ============================================================================
// Mock Texture
// ============================================================================

#[derive(Debug)]
pub struct MockTexture {
    pub info: TextureInfo,
}

impl MockTexture {
    pub fn new(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            info: TextureInfo { width, height, format, usage },
        }
    }
}

impl Texture for MockTexture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

// ============================================================================
// Mock Shader / Pipeline / RenderPass / Framebuffer
// ============================================================================

#[derive(Debug)]
pub struct MockShader {
    pub layout: ShaderStageLayout,
}

impl Shader for MockShader {
    fn layout(&self) -> &ShaderStageLayout {
        &self.layout
    }
}

#[derive(Debug, Default)]
pub struct MockPipeline {
    pub layout_info: PipelineLayoutInfo,
}

impl MockPipeline {
    pub fn new(layout_info: PipelineLayoutInfo) -> Self {
        Self { layout_info }
    }
}

impl Pipeline for MockPipeline {
    fn layout_info(&self) -> &PipelineLayoutInfo {
        &self.layout_info
    }
}

#[derive(Debug)]
pub struct MockRenderPass {
    pub desc: RenderPassDesc,
}

impl RenderPass for MockRenderPass {}

#[derive(Debug)]
pub struct MockFramebuffer {
    pub width: u32,
    pub height: u32,
    pub formats: Vec<TextureFormat>,
}

impl Framebuffer for MockFramebuffer {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn formats(&self) -> &[TextureFormat] {
        &self.formats
    }
}

// ============================================================================
// Mock Descriptor sets
// ============================================================================

#[derive(Debug)]
pub struct MockDescriptorSet {
    pub set_type: DescriptorSetType,
    pub id: u32,
    /// Live-set counter of the allocator that handed this set out
    live: Option<Arc<AtomicUsize>>,
}

impl DescriptorSet for MockDescriptorSet {
    fn set_type(&self) -> DescriptorSetType {
        self.set_type
    }
}

impl Drop for MockDescriptorSet {
    fn drop(&mut self) {
        if let Some(live) = &self.live {
            live.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

pub fn mock_set(set_type: DescriptorSetType) -> Arc<dyn DescriptorSet> {
    Arc::new(MockDescriptorSet { set_type, id: 0, live: None })
}

#[derive(Debug, Default)]
pub struct MockDescriptorAllocator {
    next_id: AtomicU32,
    live: Arc<AtomicUsize>,
    pub allocated: Mutex<Vec<DescriptorSetType>>,
}

impl MockDescriptorAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets handed out and not dropped yet
    pub fn live_sets(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }
}

impl DescriptorAllocator for MockDescriptorAllocator {
    fn free_descriptor_set(&self, set_type: DescriptorSetType) -> Result<Arc<dyn DescriptorSet>> {
        self.allocated.lock().unwrap().push(set_type);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(MockDescriptorSet { set_type, id, live: Some(Arc::clone(&self.live)) }))
    }
}

// ============================================================================
// Mock CommandList
// ============================================================================

#[derive(Default)]
pub struct MockCommandList {
    pub commands: Vec<String>,
    /// Every `pipeline_barrier` call, kept whole for identity checks
    pub barriers: Vec<Vec<ImageBarrier>>,
}

impl MockCommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the first command starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.commands.iter().position(|c| c.starts_with(prefix))
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

impl CommandList for MockCommandList {
    fn begin(&mut self) -> Result<()> {
        self.commands.clear();
        self.barriers.clear();
        self.commands.push("begin".to_string());
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        self.commands.push("end".to_string());
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        _render_pass: &Arc<dyn RenderPass>,
        framebuffer: &Arc<dyn Framebuffer>,
        clear_values: &[ClearValue],
    ) -> Result<()> {
        if clear_values.len() != framebuffer.formats().len() {
            engine_bail!("rendergraph::mock", "{} clear values for {} attachments",
                clear_values.len(), framebuffer.formats().len());
        }
        self.commands.push(format!(
            "begin_render_pass {}x{} {:?}",
            framebuffer.width(), framebuffer.height(), framebuffer.formats()
        ));
        Ok(())
    }

    fn end_render_pass(&mut self) -> Result<()> {
        self.commands.push("end_render_pass".to_string());
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.commands.push(format!("set_viewport {}x{}", viewport.width, viewport.height));
        Ok(())
    }

    fn set_scissor(&mut self, scissor: Rect2D) -> Result<()> {
        self.commands.push(format!("set_scissor {}x{}", scissor.width, scissor.height));
        Ok(())
    }

    fn bind_pipeline(&mut self, _pipeline: &Arc<dyn Pipeline>) -> Result<()> {
        self.commands.push("bind_pipeline".to_string());
        Ok(())
    }

    fn bind_descriptor_sets(
        &mut self,
        _pipeline: &Arc<dyn Pipeline>,
        first_set: u32,
        sets: &[&Arc<dyn DescriptorSet>],
    ) -> Result<()> {
        let types: Vec<String> = sets.iter().map(|s| s.set_type().to_string()).collect();
        self.commands.push(format!("bind_descriptor_sets {} [{}]", first_set, types.join(", ")));
        Ok(())
    }

    fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[Arc<dyn Buffer>],
        offsets: &[u64],
    ) -> Result<()> {
        self.commands.push(format!(
            "bind_vertex_buffers {} count={} offsets={:?}",
            first_binding, buffers.len(), offsets
        ));
        Ok(())
    }

    fn bind_index_buffer(&mut self, _buffer: &Arc<dyn Buffer>, offset: u64, index_type: IndexType) -> Result<()> {
        self.commands.push(format!("bind_index_buffer {:?} offset={}", index_type, offset));
        Ok(())
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32) -> Result<()> {
        self.commands.push(format!("draw {} x{}", vertex_count, instance_count));
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
    ) -> Result<()> {
        self.commands.push(format!("draw_indexed {} x{}", index_count, instance_count));
        Ok(())
    }

    fn pipeline_barrier(&mut self, barriers: &[ImageBarrier]) -> Result<()> {
        let described: Vec<String> = barriers
            .iter()
            .map(|b| format!("{:?} {:?}->{:?}", b.texture.info().format, b.old_layout, b.new_layout))
            .collect();
        self.commands.push(format!("pipeline_barrier [{}]", described.join(", ")));
        self.barriers.push(barriers.to_vec());
        Ok(())
    }
}

// ============================================================================
// Mock Swapchain
// ============================================================================

pub struct MockSwapchain {
    pub extent: Extent2D,
    pub images: Vec<Arc<dyn Texture>>,
    next_image: u32,
    /// Outcomes returned before falling back to cycling images
    pub scripted_acquires: VecDeque<AcquireOutcome>,
    pub scripted_presents: VecDeque<PresentOutcome>,
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockSwapchain {
    pub fn new(width: u32, height: u32, image_count: u32) -> Self {
        let images = (0..image_count)
            .map(|_| Arc::new(MockTexture::new(width, height, MOCK_PRESENTATION_FORMAT, TextureUsage::COLOR_ATTACHMENT)) as Arc<dyn Texture>)
            .collect();
        Self {
            extent: Extent2D { width, height },
            images,
            next_image: 0,
            scripted_acquires: VecDeque::new(),
            scripted_presents: VecDeque::new(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Swapchain for MockSwapchain {
    fn acquire_next_image(&mut self, frame_index: usize) -> Result<AcquireOutcome> {
        let outcome = match self.scripted_acquires.pop_front() {
            Some(outcome) => outcome,
            None => {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.images.len() as u32;
                AcquireOutcome::Image(index)
            }
        };
        self.events.lock().unwrap().push(format!("acquire {} -> {:?}", frame_index, outcome));
        Ok(outcome)
    }

    fn present(&mut self, frame_index: usize, image_index: u32) -> Result<PresentOutcome> {
        let outcome = self.scripted_presents.pop_front().unwrap_or(PresentOutcome::Presented);
        self.events.lock().unwrap().push(format!("present {} image {} -> {:?}", frame_index, image_index, outcome));
        Ok(outcome)
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        let count = self.images.len() as u32;
        *self = Self {
            scripted_acquires: std::mem::take(&mut self.scripted_acquires),
            scripted_presents: std::mem::take(&mut self.scripted_presents),
            events: Arc::clone(&self.events),
            ..Self::new(width, height, count)
        };
        self.events.lock().unwrap().push(format!("recreate {}x{}", width, height));
        Ok(())
    }

    fn extent(&self) -> Extent2D {
        self.extent
    }

    fn format(&self) -> TextureFormat {
        MOCK_PRESENTATION_FORMAT
    }

    fn images(&self) -> &[Arc<dyn Texture>] {
        &self.images
    }
}

// ============================================================================
// Mock Renderer
// ============================================================================

/// Mock renderer tracking created resources and frame events
pub struct MockRenderer {
    pub device_info: DeviceInfo,
    pub frames_in_flight: usize,
    pub created_textures: Arc<Mutex<Vec<String>>>,
    pub created_render_passes: Arc<Mutex<Vec<RenderPassDesc>>>,
    pub created_framebuffers: Arc<Mutex<Vec<String>>>,
    pub sampled_writes: Arc<Mutex<Vec<String>>>,
    pub registered_layouts: Arc<Mutex<Vec<DescriptorSetType>>>,
    /// wait_for_frame / submit / wait_idle, in call order
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self {
            device_info: mock_device_info(),
            frames_in_flight: crate::renderer::FRAMES_IN_FLIGHT,
            created_textures: Arc::new(Mutex::new(Vec::new())),
            created_render_passes: Arc::new(Mutex::new(Vec::new())),
            created_framebuffers: Arc::new(Mutex::new(Vec::new())),
            sampled_writes: Arc::new(Mutex::new(Vec::new())),
            registered_layouts: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get_created_textures(&self) -> Vec<String> {
        self.created_textures.lock().unwrap().clone()
    }

    pub fn get_events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl Renderer for MockRenderer {
    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    fn register_descriptor_set_layout(&self, desc: &DescriptorSetLayoutDesc) -> Result<()> {
        self.registered_layouts.lock().unwrap().push(desc.set_type);
        Ok(())
    }

    fn create_attachment_texture(&self, desc: &TextureDesc) -> Result<Arc<dyn Texture>> {
        self.created_textures.lock().unwrap().push(format!(
            "{}x{} {:?} {:?}", desc.width, desc.height, desc.format, desc.usage
        ));
        Ok(Arc::new(MockTexture::new(desc.width, desc.height, desc.format, desc.usage)))
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<Arc<dyn RenderPass>> {
        self.created_render_passes.lock().unwrap().push(desc.clone());
        Ok(Arc::new(MockRenderPass { desc: desc.clone() }))
    }

    fn create_framebuffer(&self, desc: &FramebufferDesc) -> Result<Arc<dyn Framebuffer>> {
        let formats: Vec<TextureFormat> = desc.attachments.iter().map(|t| t.info().format).collect();
        self.created_framebuffers.lock().unwrap().push(format!("{}x{} {:?}", desc.width, desc.height, formats));
        Ok(Arc::new(MockFramebuffer {
            width: desc.width,
            height: desc.height,
            formats,
        }))
    }

    fn write_sampled_images(&self, set: &Arc<dyn DescriptorSet>, writes: &[SampledImageWrite]) -> Result<()> {
        let mut log = self.sampled_writes.lock().unwrap();
        for write in writes {
            log.push(format!(
                "{} binding {} {:?} {:?}",
                set.set_type(), write.binding, write.texture.info().format, write.layout
            ));
        }
        Ok(())
    }

    fn create_shader(&self, desc: &ShaderDesc) -> Result<Arc<dyn Shader>> {
        let mut layout = ShaderStageLayout::new(desc.stage);
        layout.set_types = desc.set_types.clone();
        Ok(Arc::new(MockShader { layout }))
    }

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Arc<dyn Pipeline>> {
        Ok(Arc::new(MockPipeline::new(desc.layout_info()?)))
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<dyn Buffer>> {
        Ok(Arc::new(MockBuffer::new(desc.size, "buffer")))
    }

    fn create_command_list(&self) -> Result<Box<dyn CommandList>> {
        Ok(Box::new(MockCommandList::new()))
    }

    fn create_swapchain(&self, window: &Window) -> Result<Box<dyn Swapchain>> {
        let size = window.inner_size();
        Ok(Box::new(MockSwapchain::new(size.width, size.height, 3)))
    }

    fn wait_for_frame(&self, frame_index: usize) -> Result<()> {
        self.events.lock().unwrap().push(format!("wait_for_frame {}", frame_index));
        Ok(())
    }

    fn submit(
        &self,
        _commands: &dyn CommandList,
        frame_index: usize,
        _swapchain: &dyn Swapchain,
        image_index: u32,
    ) -> Result<()> {
        self.events.lock().unwrap().push(format!("submit {} image {}", frame_index, image_index));
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.events.lock().unwrap().push("wait_idle".to_string());
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_renderer_tests.rs"]
mod tests;
