use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u32);

impl ResourceId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferUsage {
    VertexBuffer,
    #[default]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureUsage {
    BackBuffer,
    DepthStencilBuffer,
    ColorAttachment,
    #[default]
    Invalid,
}

/// A logical buffer. Nothing is allocated until the graph is compiled.
#[derive(Debug, Clone)]
pub struct BufferResource {
    name: String,
    usage: BufferUsage,
    element_size: u32,
    data_size: u64,
    data: Option<Vec<u8>>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl BufferResource {
    /// A buffer whose contents are uploaded into host visible memory at compile time.
    pub fn with_data(name: &str, usage: BufferUsage, element_size: u32, data: &[u8]) -> Self {
        Self {
            name: name.to_string(),
            usage,
            element_size,
            data_size: data.len() as u64,
            data: Some(data.to_vec()),
            vertex_attributes: Vec::new(),
        }
    }

    /// A device local buffer left uninitialized.
    pub fn uninitialized(name: &str, usage: BufferUsage, element_size: u32, data_size: u64) -> Self {
        Self {
            name: name.to_string(),
            usage,
            element_size,
            data_size,
            data: None,
            vertex_attributes: Vec::new(),
        }
    }

    /// Appends a vertex attribute. Locations are handed out in call order, starting at 0.
    pub fn add_vertex_attribute(&mut self, format: vk::Format, offset: u32) -> &mut Self {
        let attribute = vk::VertexInputAttributeDescription::default()
            .location(self.vertex_attributes.len() as u32)
            .format(format)
            .offset(offset);
        self.vertex_attributes.push(attribute);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    pub fn data_size(&self) -> u64 {
        self.data_size
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn vertex_attributes(&self) -> &[vk::VertexInputAttributeDescription] {
        &self.vertex_attributes
    }
}

#[derive(Debug, Clone)]
pub struct TextureResource {
    name: String,
    usage: TextureUsage,
    format: vk::Format,
}

impl TextureResource {
    pub fn new(name: &str, usage: TextureUsage, format: vk::Format) -> Self {
        Self {
            name: name.to_string(),
            usage,
            format,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

#[derive(Debug, Clone)]
pub enum RenderResource {
    Buffer(BufferResource),
    Texture(TextureResource),
}

impl RenderResource {
    pub fn name(&self) -> &str {
        match self {
            RenderResource::Buffer(buffer) => buffer.name(),
            RenderResource::Texture(texture) => texture.name(),
        }
    }

    pub fn as_buffer(&self) -> Option<&BufferResource> {
        match self {
            RenderResource::Buffer(buffer) => Some(buffer),
            RenderResource::Texture(_) => None,
        }
    }

    pub fn as_texture(&self) -> Option<&TextureResource> {
        match self {
            RenderResource::Texture(texture) => Some(texture),
            RenderResource::Buffer(_) => None,
        }
    }

    pub(crate) fn has_valid_usage(&self) -> bool {
        match self {
            RenderResource::Buffer(buffer) => buffer.usage != BufferUsage::Invalid,
            RenderResource::Texture(texture) => texture.usage != TextureUsage::Invalid,
        }
    }
}

impl From<BufferResource> for RenderResource {
    fn from(buffer: BufferResource) -> Self {
        RenderResource::Buffer(buffer)
    }
}

impl From<TextureResource> for RenderResource {
    fn from(texture: TextureResource) -> Self {
        RenderResource::Texture(texture)
    }
}

pub(crate) fn aspect_mask_from_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D32_SFLOAT_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Aspect mask of the view built for a texture: colour textures always use the colour
/// aspect, depth stencil buffers use whatever aspects their format carries.
pub(crate) fn texture_aspect_mask(texture: &TextureResource) -> vk::ImageAspectFlags {
    match texture.usage {
        TextureUsage::DepthStencilBuffer => match aspect_mask_from_format(texture.format) {
            vk::ImageAspectFlags::COLOR => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            aspect => aspect,
        },
        _ => vk::ImageAspectFlags::COLOR,
    }
}
