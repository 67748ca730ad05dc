use std::error::Error;
use std::ffi::CStr;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ash::{ext::debug_utils, khr, vk};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use vulkan_frame_graph::{
    AshDevice, BufferResource, BufferUsage, FrameGraph, FrameGraphOptions, GraphicsStage, Shader,
    SwapchainInfo, TextureResource, TextureUsage, shader::compile_wgsl,
};

const WINDOW_TITLE: &str = "Vulkan Frame Graph";
const INITIAL_WIDTH: u32 = 800;
const INITIAL_HEIGHT: u32 = 600;

const TRIANGLE_SHADER: &str = include_str!("shaders/triangle.wgsl");
const VERTEX_BUFFER_NAME: &str = "triangle vertices";
const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
const CLEAR_COLOR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

type AppResult<T> = Result<T, Box<dyn Error>>;

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

// Clip space with y up; `compile_wgsl` flips it. Clockwise on screen.
const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, 0.5, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [0.5, -0.5, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-0.5, -0.5, 0.0],
        color: [0.0, 0.0, 1.0],
    },
];

fn main() -> AppResult<()> {
    env_logger::init();
    let event_loop = EventLoop::builder().build()?;
    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run_app(&mut App::default())?;
    Ok(())
}

#[derive(Default)]
struct App {
    // Dropped before the window so the surface goes first.
    renderer: Option<Renderer>,
    window: Option<Window>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::PhysicalSize::new(INITIAL_WIDTH, INITIAL_HEIGHT));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => window,
            Err(error) => {
                log::error!("Failed to create window: {error}");
                event_loop.exit();
                return;
            }
        };

        match Renderer::new(&window, INITIAL_WIDTH, INITIAL_HEIGHT) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(error) => {
                log::error!("Failed to create renderer: {error}");
                event_loop.exit();
            }
        }
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    if size.width > 0 && size.height > 0 {
                        renderer.is_swapchain_dirty = true;
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut())
                else {
                    return;
                };

                let size = window.inner_size();
                if size.width == 0 || size.height == 0 {
                    return;
                }

                if renderer.is_swapchain_dirty {
                    if let Err(error) = renderer.resize(size.width, size.height) {
                        log::error!("Failed to rebuild swapchain: {error}");
                        return;
                    }
                }

                if let Err(error) = renderer.draw() {
                    log::error!("Failed to draw frame: {error}");
                }
                window.request_redraw();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer = None;
    }
}

/// Instance, surface, logical device and queues. Everything else in the binary is
/// created from and destroyed before this.
struct VulkanContext {
    instance: ash::Instance,
    surface_loader: khr::surface::Instance,
    surface: vk::SurfaceKHR,
    debug_messenger: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue_families: QueueFamilies,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    _entry: ash::Entry,
}

#[derive(Debug, Clone, Copy)]
struct QueueFamilies {
    graphics: u32,
    present: u32,
}

impl VulkanContext {
    fn new(window: &(impl HasDisplayHandle + HasWindowHandle)) -> AppResult<Self> {
        let entry = unsafe { ash::Entry::load()? };
        let display_handle = window.display_handle()?.as_raw();
        let instance = create_instance(&entry, display_handle)?;
        log::info!("Created vulkan instance");

        let debug_messenger = if cfg!(debug_assertions) {
            Some(create_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface_loader = khr::surface::Instance::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display_handle,
                window.window_handle()?.as_raw(),
                None,
            )?
        };
        log::info!("Created vulkan surface");

        let (physical_device, queue_families) =
            pick_physical_device(&instance, &surface_loader, surface)?;
        log::info!("Selected physical device with queue families {queue_families:?}");

        let device = create_device(&instance, physical_device, queue_families)?;
        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        log::info!("Created vulkan logical device");

        Ok(Self {
            instance,
            surface_loader,
            surface,
            debug_messenger,
            physical_device,
            device,
            queue_families,
            graphics_queue,
            present_queue,
            _entry: entry,
        })
    }

    fn create_allocator(&self) -> AppResult<gpu_allocator::vulkan::Allocator> {
        let desc = gpu_allocator::vulkan::AllocatorCreateDesc {
            instance: self.instance.clone(),
            device: self.device.clone(),
            physical_device: self.physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            buffer_device_address: false,
            allocation_sizes: gpu_allocator::AllocationSizes::default(),
        };
        Ok(gpu_allocator::vulkan::Allocator::new(&desc)?)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug_messenger.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn create_instance(
    entry: &ash::Entry,
    display_handle: raw_window_handle::RawDisplayHandle,
) -> AppResult<ash::Instance> {
    let app_info = vk::ApplicationInfo::default()
        .application_name(c"vulkan-frame-graph")
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_2);

    let mut extensions = ash_window::enumerate_required_extensions(display_handle)?.to_vec();
    let mut layers = Vec::new();
    if cfg!(debug_assertions) {
        extensions.push(debug_utils::NAME.as_ptr());
        layers.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
    }

    let mut flags = vk::InstanceCreateFlags::empty();
    if cfg!(any(target_os = "macos", target_os = "ios")) {
        extensions.push(khr::portability_enumeration::NAME.as_ptr());
        extensions.push(khr::get_physical_device_properties2::NAME.as_ptr());
        flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let create_info = vk::InstanceCreateInfo::default()
        .flags(flags)
        .application_info(&app_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions);
    Ok(unsafe { entry.create_instance(&create_info, None)? })
}

fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> AppResult<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    type Severity = vk::DebugUtilsMessageSeverityFlagsEXT;
    type Kind = vk::DebugUtilsMessageTypeFlagsEXT;

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(Severity::VERBOSE | Severity::INFO | Severity::WARNING | Severity::ERROR)
        .message_type(Kind::GENERAL | Kind::VALIDATION | Kind::PERFORMANCE)
        .pfn_user_callback(Some(forward_validation_message));
    let loader = debug_utils::Instance::new(entry, instance);
    let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
    log::info!("Created vulkan debug messenger");
    Ok((loader, messenger))
}

unsafe extern "system" fn forward_validation_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let message = unsafe {
        if data.is_null() || (*data).p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr((*data).p_message).to_string_lossy()
    };
    let level = if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Debug
    } else {
        log::Level::Trace
    };
    log::log!(level, "[{kind:?}] {message}");
    vk::FALSE
}

/// Prefers a discrete GPU, then an integrated one, among the devices that can present
/// to the surface and render to the depth format.
fn pick_physical_device(
    instance: &ash::Instance,
    surface_loader: &khr::surface::Instance,
    surface: vk::SurfaceKHR,
) -> AppResult<(vk::PhysicalDevice, QueueFamilies)> {
    let rank = |device_type: vk::PhysicalDeviceType| match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 2,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        _ => 0,
    };

    let mut best = None;
    for physical_device in unsafe { instance.enumerate_physical_devices()? } {
        if !is_suitable(instance, surface_loader, surface, physical_device)? {
            continue;
        }
        let Some(families) = find_queue_families(instance, surface_loader, surface, physical_device)?
        else {
            continue;
        };
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let score = rank(properties.device_type);
        if best.as_ref().is_none_or(|(best_score, _, _)| score > *best_score) {
            best = Some((score, physical_device, families));
        }
    }

    best.map(|(_, physical_device, families)| (physical_device, families))
        .ok_or_else(|| "No vulkan device can present to this window".into())
}

fn is_suitable(
    instance: &ash::Instance,
    surface_loader: &khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> AppResult<bool> {
    let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device)? };
    let has_swapchain = extensions.iter().any(|extension| {
        extension
            .extension_name_as_c_str()
            .is_ok_and(|name| name == khr::swapchain::NAME)
    });
    if !has_swapchain {
        return Ok(false);
    }

    let formats =
        unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface)? };
    let present_modes = unsafe {
        surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
    };
    let depth_features = unsafe {
        instance
            .get_physical_device_format_properties(physical_device, DEPTH_FORMAT)
            .optimal_tiling_features
    };

    Ok(!formats.is_empty()
        && !present_modes.is_empty()
        && depth_features.contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT))
}

fn find_queue_families(
    instance: &ash::Instance,
    surface_loader: &khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
) -> AppResult<Option<QueueFamilies>> {
    let properties =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let graphics = properties.iter().position(|family| {
        family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    });

    let mut present = None;
    for index in 0..properties.len() as u32 {
        let supported = unsafe {
            surface_loader.get_physical_device_surface_support(physical_device, index, surface)?
        };
        if supported {
            present = Some(index);
            break;
        }
    }

    Ok(graphics
        .zip(present)
        .map(|(graphics, present)| QueueFamilies {
            graphics: graphics as u32,
            present,
        }))
}

fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    families: QueueFamilies,
) -> AppResult<ash::Device> {
    let mut family_indices = vec![families.graphics, families.present];
    family_indices.dedup();

    let priorities = [1.0f32];
    let queue_infos: Vec<_> = family_indices
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let mut extensions = vec![khr::swapchain::NAME.as_ptr()];
    if cfg!(any(target_os = "macos", target_os = "ios")) {
        extensions.push(c"VK_KHR_portability_subset".as_ptr());
    }

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions);
    Ok(unsafe { instance.create_device(physical_device, &create_info, None)? })
}

struct Swapchain {
    loader: khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    extent: vk::Extent2D,
    format: vk::SurfaceFormatKHR,
    image_views: Vec<vk::ImageView>,
}

impl Swapchain {
    fn new(context: &VulkanContext, width: u32, height: u32) -> AppResult<Self> {
        let surface_loader = &context.surface_loader;
        let (physical_device, surface) = (context.physical_device, context.surface);

        let formats =
            unsafe { surface_loader.get_physical_device_surface_formats(physical_device, surface)? };
        let format = choose_surface_format(&formats);

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };
        let present_mode = if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            vk::PresentModeKHR::FIFO
        };

        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let extent = choose_extent(&capabilities, width, height);
        let mut image_count = capabilities.min_image_count + 1;
        if capabilities.max_image_count > 0 {
            image_count = image_count.min(capabilities.max_image_count);
        }

        let families = context.queue_families;
        let shared_families = [families.graphics, families.present];
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);
        if families.graphics != families.present {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&shared_families);
        }

        let loader = khr::swapchain::Device::new(&context.instance, &context.device);
        let handle = unsafe { loader.create_swapchain(&create_info, None)? };
        let mut swapchain = Self {
            loader,
            handle,
            extent,
            format,
            image_views: Vec::new(),
        };

        let images = match unsafe { swapchain.loader.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(error) => {
                swapchain.destroy(&context.device);
                return Err(error.into());
            }
        };
        for image in images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            match unsafe { context.device.create_image_view(&view_info, None) } {
                Ok(view) => swapchain.image_views.push(view),
                Err(error) => {
                    swapchain.destroy(&context.device);
                    return Err(error.into());
                }
            }
        }

        log::info!(
            "Created swapchain: {} images, {}x{}, {:?}, {:?}",
            swapchain.image_views.len(),
            extent.width,
            extent.height,
            format.format,
            present_mode
        );
        Ok(swapchain)
    }

    fn info(&self) -> SwapchainInfo {
        SwapchainInfo {
            extent: self.extent,
            format: self.format.format,
            image_views: self.image_views.clone(),
        }
    }

    fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
        self.handle = vk::SwapchainKHR::null();
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    match formats {
        [only] if only.format == vk::Format::UNDEFINED => preferred,
        _ => formats
            .iter()
            .copied()
            .find(|format| {
                format.format == preferred.format && format.color_space == preferred.color_space
            })
            .or_else(|| formats.first().copied())
            .unwrap_or(preferred),
    }
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: width.clamp(min.width, max.width),
        height: height.clamp(min.height, max.height),
    }
}

/// The triangle frame graph plus the shader modules it is compiled against. The graph
/// is rebuilt whenever the swapchain changes.
struct Scene {
    frame_graph: Option<FrameGraph<AshDevice>>,
    vertex_shader: Shader,
    fragment_shader: Shader,
    gpu: Arc<AshDevice>,
    start: Instant,
}

impl Scene {
    fn new(gpu: Arc<AshDevice>) -> AppResult<Self> {
        let vertex_code = compile_wgsl(TRIANGLE_SHADER, naga::ShaderStage::Vertex, "vs_main")?;
        let fragment_code = compile_wgsl(TRIANGLE_SHADER, naga::ShaderStage::Fragment, "fs_main")?;

        let shaders = create_shaders(
            &[
                (vertex_code.as_slice(), vk::ShaderStageFlags::VERTEX, "vs_main"),
                (fragment_code.as_slice(), vk::ShaderStageFlags::FRAGMENT, "fs_main"),
            ],
            |code| gpu.create_shader_module(code),
            |module| gpu.destroy_shader_module(module),
        )?;
        let [vertex_shader, fragment_shader]: [Shader; 2] = match shaders.try_into() {
            Ok(shaders) => shaders,
            Err(shaders) => {
                shaders
                    .iter()
                    .for_each(|shader: &Shader| gpu.destroy_shader_module(shader.module()));
                return Err("Expected a vertex and a fragment shader".into());
            }
        };

        Ok(Self {
            frame_graph: None,
            vertex_shader,
            fragment_shader,
            gpu,
            start: Instant::now(),
        })
    }

    fn build_frame_graph(&mut self, swapchain: &Swapchain) -> AppResult<()> {
        let info = swapchain.info();
        let back_buffer_format = info.format;
        let mut frame_graph = FrameGraph::new(
            self.gpu.clone(),
            info,
            FrameGraphOptions {
                clear_color: CLEAR_COLOR,
                print_graph_report: log::log_enabled!(log::Level::Trace),
                ..Default::default()
            },
        );

        let mut vertex_buffer = BufferResource::with_data(
            VERTEX_BUFFER_NAME,
            BufferUsage::VertexBuffer,
            std::mem::size_of::<Vertex>() as u32,
            bytemuck::cast_slice(&TRIANGLE),
        );
        vertex_buffer
            .add_vertex_attribute(
                vk::Format::R32G32B32_SFLOAT,
                std::mem::offset_of!(Vertex, position) as u32,
            )
            .add_vertex_attribute(
                vk::Format::R32G32B32_SFLOAT,
                std::mem::offset_of!(Vertex, color) as u32,
            );
        let vertices = frame_graph.add_resource(vertex_buffer)?;
        let depth_buffer = frame_graph.add_resource(TextureResource::new(
            "depth buffer",
            TextureUsage::DepthStencilBuffer,
            DEPTH_FORMAT,
        ))?;
        let back_buffer = frame_graph.add_resource(TextureResource::new(
            "back buffer",
            TextureUsage::BackBuffer,
            back_buffer_format,
        ))?;

        let mut main_stage = GraphicsStage::new("main stage", |context| {
            context.cmd.draw(TRIANGLE.len() as u32, 1, 0, 0);
        });
        main_stage
            .reads_from(vertices)
            .bind_buffer(vertices, 0)
            .writes_to(back_buffer)
            .writes_to(depth_buffer)
            .uses_shader(&self.vertex_shader)
            .uses_shader(&self.fragment_shader);
        frame_graph.add_stage(main_stage)?;

        frame_graph.compile(back_buffer)?;
        self.frame_graph = Some(frame_graph);
        Ok(())
    }

    /// Spins the triangle by rewriting the mapped vertex buffer.
    fn animate(&mut self) -> AppResult<()> {
        let Some(frame_graph) = self.frame_graph.as_mut() else {
            return Ok(());
        };
        let Some(vertices) = frame_graph.resource_id(VERTEX_BUFFER_NAME) else {
            return Ok(());
        };

        let rotated = rotated_triangle(self.start.elapsed().as_secs_f32());
        frame_graph.update_buffer(vertices, 0, bytemuck::cast_slice(&rotated))?;
        Ok(())
    }
}

/// Rotates the triangle about the z axis, keeping its winding.
fn rotated_triangle(angle: f32) -> [Vertex; 3] {
    let (sin, cos) = angle.sin_cos();
    TRIANGLE.map(|vertex| {
        let [x, y, z] = vertex.position;
        Vertex {
            position: [x * cos - y * sin, x * sin + y * cos, z],
            color: vertex.color,
        }
    })
}

/// Creates one module per entry. If a module or its entry point fails, every module
/// created so far is destroyed before the error is returned.
fn create_shaders<E: Into<Box<dyn Error>>>(
    entries: &[(&[u32], vk::ShaderStageFlags, &str)],
    mut create: impl FnMut(&[u32]) -> Result<vk::ShaderModule, E>,
    mut destroy: impl FnMut(vk::ShaderModule),
) -> AppResult<Vec<Shader>> {
    let mut shaders: Vec<Shader> = Vec::with_capacity(entries.len());
    for &(code, stage, entry_point) in entries {
        let shader = match create(code) {
            Ok(module) => Shader::new(module, stage, entry_point).map_err(|error| {
                destroy(module);
                Box::<dyn Error>::from(error)
            }),
            Err(error) => Err(error.into()),
        };
        match shader {
            Ok(shader) => shaders.push(shader),
            Err(error) => {
                for shader in &shaders {
                    destroy(shader.module());
                }
                return Err(error);
            }
        }
    }
    Ok(shaders)
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.frame_graph = None;
        self.gpu.destroy_shader_module(self.vertex_shader.module());
        self.gpu.destroy_shader_module(self.fragment_shader.module());
    }
}

struct Renderer {
    scene: Option<Scene>,
    swapchain: Swapchain,
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    is_swapchain_dirty: bool,
    context: VulkanContext,
}

impl Renderer {
    fn new(window: &Window, width: u32, height: u32) -> AppResult<Self> {
        let context = VulkanContext::new(window)?;

        let allocator = Arc::new(Mutex::new(context.create_allocator()?));
        let gpu = Arc::new(AshDevice::new(
            context.device.clone(),
            allocator,
            context.queue_families.graphics,
        )?);
        log::info!("Created frame graph device");

        let mut swapchain = Swapchain::new(&context, width, height)?;
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let semaphores = unsafe {
            context
                .device
                .create_semaphore(&semaphore_info, None)
                .and_then(|first| {
                    context
                        .device
                        .create_semaphore(&semaphore_info, None)
                        .map(|second| (first, second))
                        .inspect_err(|_| context.device.destroy_semaphore(first, None))
                })
        };
        let (image_available, render_finished) = match semaphores {
            Ok(semaphores) => semaphores,
            Err(error) => {
                swapchain.destroy(&context.device);
                return Err(error.into());
            }
        };

        // From here on Drop releases whatever has been created.
        let mut renderer = Self {
            scene: None,
            swapchain,
            image_available,
            render_finished,
            is_swapchain_dirty: false,
            context,
        };

        let mut scene = Scene::new(gpu)?;
        scene.build_frame_graph(&renderer.swapchain)?;
        renderer.scene = Some(scene);
        log::info!("Compiled frame graph");

        Ok(renderer)
    }

    fn resize(&mut self, width: u32, height: u32) -> AppResult<()> {
        log::info!("Rebuilding swapchain at {width}x{height}");
        unsafe { self.context.device.device_wait_idle()? };

        // The old graph's framebuffers reference the old swapchain views.
        if let Some(scene) = self.scene.as_mut() {
            scene.frame_graph = None;
        }
        self.swapchain.destroy(&self.context.device);
        self.swapchain = Swapchain::new(&self.context, width, height)?;

        if let Some(scene) = self.scene.as_mut() {
            scene.build_frame_graph(&self.swapchain)?;
        }
        self.is_swapchain_dirty = false;
        Ok(())
    }

    fn draw(&mut self) -> AppResult<()> {
        let Some(scene) = self.scene.as_mut() else {
            return Ok(());
        };

        let acquired = unsafe {
            self.swapchain.loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                self.image_available,
                vk::Fence::null(),
            )
        };
        let image_index = match acquired {
            Ok((image_index, _suboptimal)) => image_index,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.is_swapchain_dirty = true;
                return Ok(());
            }
            Err(error) => return Err(error.into()),
        };

        scene.animate()?;
        if let Some(frame_graph) = scene.frame_graph.as_ref() {
            frame_graph.render(
                image_index,
                self.render_finished,
                self.image_available,
                self.context.graphics_queue,
            )?;
        }

        let wait_semaphores = [self.render_finished];
        let swapchains = [self.swapchain.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let presented = unsafe {
            self.swapchain
                .loader
                .queue_present(self.context.present_queue, &present_info)
        };
        match presented {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.is_swapchain_dirty = true,
            Err(error) => return Err(error.into()),
        }

        // No frames in flight: the next buffer update and semaphore reuse wait for this
        // frame to finish.
        unsafe { self.context.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe {
            let _ = device.device_wait_idle();
        }
        // Releases the graph, then the command pool and allocator with the last
        // reference to the frame graph device.
        self.scene = None;
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
        }
        self.swapchain.destroy(device);
        log::info!("Destroyed renderer");
    }
}
