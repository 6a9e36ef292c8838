//! Raw object layout of the vendor SDK
//!
//! The SDK exports C++ interfaces with single inheritance and no virtual
//! destructors. Every object therefore starts with a pointer to its vtable,
//! and slot 0 of every vtable is `release()` from the shared `IRelease`
//! base. The remaining slots follow declaration order in the vendor
//! headers. Only 64-bit targets are supported, where member functions use
//! the platform C calling convention with `this` as the first argument.
//!
//! ```text
//! object ──► [ *const Vtable ]
//!                   │
//!                   ▼
//!            [ release | method 1 | method 2 | ... ]
//! ```
//!
//! Nothing here is safe to call directly; [`crate::native`] wraps each
//! object in an owning handle.

use std::ffi::{c_char, c_float, c_int, c_uint, c_void};

/// `IRelease::release`, present at slot 0 of every vtable
pub(crate) type ReleaseFn = unsafe extern "C" fn(this: *mut c_void);

/// Any SDK object: a pointer to its vtable followed by private state
#[repr(C)]
pub(crate) struct RawObject<V> {
    pub(crate) vtable: *const V,
}

/// Vtables that begin with `release`
pub(crate) trait Vtable {
    fn release(&self) -> ReleaseFn;
}

macro_rules! impl_vtable {
    ($($vtable:ty),* $(,)?) => {
        $(
            impl Vtable for $vtable {
                fn release(&self) -> ReleaseFn {
                    self.release
                }
            }
        )*
    };
}

/// `tsvb::ILockedFrameData`
#[repr(C)]
pub(crate) struct LockedFrameDataVtable {
    pub(crate) release: ReleaseFn,
    pub(crate) bytes_per_line: unsafe extern "C" fn(this: *mut c_void, plane: c_int) -> c_uint,
    pub(crate) data_pointer: unsafe extern "C" fn(this: *mut c_void, plane: c_int) -> *mut c_void,
}

/// `tsvb::IFrame`
#[repr(C)]
pub(crate) struct FrameVtable {
    pub(crate) release: ReleaseFn,
    pub(crate) frame_format: unsafe extern "C" fn(this: *mut c_void) -> c_int,
    pub(crate) width: unsafe extern "C" fn(this: *mut c_void) -> c_uint,
    pub(crate) height: unsafe extern "C" fn(this: *mut c_void) -> c_uint,
    pub(crate) lock: unsafe extern "C" fn(this: *mut c_void, mode: c_int) -> *mut RawObject<LockedFrameDataVtable>,
}

/// `tsvb::IFrameFactory`
#[repr(C)]
pub(crate) struct FrameFactoryVtable {
    pub(crate) release: ReleaseFn,
    pub(crate) create_bgra: unsafe extern "C" fn(
        this: *mut c_void,
        data: *mut c_void,
        bytes_per_line: c_uint,
        width: c_uint,
        height: c_uint,
        make_copy: bool,
    ) -> *mut RawObject<FrameVtable>,
    pub(crate) create_nv12: unsafe extern "C" fn(
        this: *mut c_void,
        y_data: *mut c_void,
        y_bytes_per_line: c_uint,
        uv_data: *mut c_void,
        uv_bytes_per_line: c_uint,
        width: c_uint,
        height: c_uint,
        make_copy: bool,
    ) -> *mut RawObject<FrameVtable>,
    pub(crate) load_image: unsafe extern "C" fn(this: *mut c_void, utf8_path: *const c_char) -> *mut RawObject<FrameVtable>,
}

/// `tsvb::IPipelineConfiguration`
#[repr(C)]
pub(crate) struct PipelineConfigurationVtable {
    pub(crate) release: ReleaseFn,
    pub(crate) set_backend: unsafe extern "C" fn(this: *mut c_void, backend: c_int),
    pub(crate) get_backend: unsafe extern "C" fn(this: *mut c_void) -> c_int,
    pub(crate) set_segmentation_preset: unsafe extern "C" fn(this: *mut c_void, preset: c_int),
    pub(crate) get_segmentation_preset: unsafe extern "C" fn(this: *mut c_void) -> c_int,
}

/// `tsvb::IReplacementController`
#[repr(C)]
pub(crate) struct ReplacementControllerVtable {
    pub(crate) release: ReleaseFn,
    pub(crate) set_background_image: unsafe extern "C" fn(this: *mut c_void, image: *const c_void),
    pub(crate) clear_background_image: unsafe extern "C" fn(this: *mut c_void),
}

type EnableFn = unsafe extern "C" fn(this: *mut c_void) -> c_int;
type DisableFn = unsafe extern "C" fn(this: *mut c_void);
type SetPowerFn = unsafe extern "C" fn(this: *mut c_void, power: c_float);
type GetPowerFn = unsafe extern "C" fn(this: *mut c_void) -> c_float;
type GetStateFn = unsafe extern "C" fn(this: *mut c_void) -> bool;

/// `tsvb::IPipeline`
#[repr(C)]
pub(crate) struct PipelineVtable {
    pub(crate) release: ReleaseFn,

    pub(crate) set_configuration: unsafe extern "C" fn(this: *mut c_void, config: *const c_void) -> c_int,
    pub(crate) copy_configuration: unsafe extern "C" fn(this: *mut c_void) -> *mut RawObject<PipelineConfigurationVtable>,
    pub(crate) copy_default_configuration:
        unsafe extern "C" fn(this: *mut c_void) -> *mut RawObject<PipelineConfigurationVtable>,

    pub(crate) enable_blur_background: unsafe extern "C" fn(this: *mut c_void, power: c_float) -> c_int,
    pub(crate) disable_background_blur: DisableFn,
    pub(crate) get_blur_background_state: unsafe extern "C" fn(this: *mut c_void, power: *mut c_float) -> bool,

    pub(crate) enable_replace_background: unsafe extern "C" fn(
        this: *mut c_void,
        controller: *mut *mut RawObject<ReplacementControllerVtable>,
    ) -> c_int,
    pub(crate) disable_replace_background: DisableFn,
    pub(crate) get_replace_background_state: GetStateFn,

    pub(crate) enable_denoise_background: EnableFn,
    pub(crate) disable_background_denoise: DisableFn,
    pub(crate) get_denoise_background_state: GetStateFn,
    pub(crate) set_denoise_power: SetPowerFn,
    pub(crate) get_denoise_power: GetPowerFn,
    pub(crate) set_denoise_with_face: unsafe extern "C" fn(this: *mut c_void, with_face: bool),
    pub(crate) get_denoise_with_face: GetStateFn,

    pub(crate) enable_beautification: EnableFn,
    pub(crate) disable_beautification: DisableFn,
    pub(crate) set_beautification_level: SetPowerFn,
    pub(crate) get_beautification_level: GetPowerFn,

    pub(crate) enable_color_correction: EnableFn,
    pub(crate) enable_color_correction_with_reference:
        unsafe extern "C" fn(this: *mut c_void, reference: *const c_void) -> c_int,
    pub(crate) enable_color_correction_with_lut_file:
        unsafe extern "C" fn(this: *mut c_void, utf8_path: *const c_char) -> c_int,
    pub(crate) disable_color_correction: DisableFn,
    pub(crate) set_color_correction_power: SetPowerFn,

    pub(crate) enable_smart_zoom: EnableFn,
    pub(crate) disable_smart_zoom: DisableFn,
    pub(crate) set_smart_zoom_level: SetPowerFn,
    pub(crate) get_smart_zoom_level: GetPowerFn,

    pub(crate) enable_low_light_adjustment: EnableFn,
    pub(crate) disable_low_light_adjustment: DisableFn,
    pub(crate) set_low_light_adjustment_power: SetPowerFn,
    pub(crate) get_low_light_adjustment_power: GetPowerFn,

    pub(crate) enable_sharpening: EnableFn,
    pub(crate) disable_sharpening: DisableFn,
    pub(crate) set_sharpening_power: SetPowerFn,
    pub(crate) get_sharpening_power: GetPowerFn,

    pub(crate) process: unsafe extern "C" fn(
        this: *mut c_void,
        input: *const c_void,
        error: *mut c_int,
    ) -> *mut RawObject<FrameVtable>,
}

/// `tsvb::ISDKFactory`
#[repr(C)]
pub(crate) struct SdkFactoryVtable {
    pub(crate) release: ReleaseFn,
    pub(crate) create_frame_factory: unsafe extern "C" fn(this: *mut c_void) -> *mut RawObject<FrameFactoryVtable>,
    pub(crate) create_pipeline: unsafe extern "C" fn(this: *mut c_void) -> *mut RawObject<PipelineVtable>,
}

impl_vtable!(
    LockedFrameDataVtable,
    FrameVtable,
    FrameFactoryVtable,
    PipelineConfigurationVtable,
    ReplacementControllerVtable,
    PipelineVtable,
    SdkFactoryVtable,
);

/// Exported entry point: `tsvb::ISDKFactory* createSDKFactory()`
pub(crate) type CreateSdkFactoryFn = unsafe extern "C" fn() -> *mut RawObject<SdkFactoryVtable>;

/// Name of the exported entry point, NUL terminated for symbol lookup
pub(crate) const CREATE_SDK_FACTORY_SYMBOL: &[u8] = b"createSDKFactory\0";
