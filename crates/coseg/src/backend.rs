//! Backend selection by cargo feature.

pub mod burn_backend_types {
    use burn::backend::Autodiff;
    use cfg_if::cfg_if;

    cfg_if! {
        if #[cfg(feature = "cuda")] {
            use burn::backend::cuda::{Cuda, CudaDevice};

            /// Selected backend type
            pub type InferenceBackend = Cuda;
            /// Selected device type
            pub type InferenceDevice = CudaDevice;
            /// Backend name for logging purposes
            pub const NAME: &str = "CUDA (NVIDIA GPU)";

            /// Device for the given GPU ordinal, the default device otherwise.
            pub fn create_device(gpu: Option<usize>) -> InferenceDevice {
                gpu.map_or_else(CudaDevice::default, CudaDevice::new)
            }
        } else if #[cfg(feature = "wgpu")] {
            use burn::backend::wgpu::{Wgpu, WgpuDevice};

            /// Selected backend type
            pub type InferenceBackend = Wgpu;
            /// Selected device type
            pub type InferenceDevice = WgpuDevice;
            /// Backend name for logging purposes
            pub const NAME: &str = "WGPU (GPU)";

            /// Device for the given GPU ordinal, the default device otherwise.
            pub fn create_device(gpu: Option<usize>) -> InferenceDevice {
                gpu.map_or_else(WgpuDevice::default, WgpuDevice::DiscreteGpu)
            }
        } else {
            use burn::backend::ndarray::{NdArray, NdArrayDevice};

            /// Selected backend type
            pub type InferenceBackend = NdArray;
            /// Selected device type
            pub type InferenceDevice = NdArrayDevice;
            /// Backend name for logging purposes
            pub const NAME: &str = "NdArray (CPU)";

            /// The CPU device; a GPU ordinal is ignored.
            pub fn create_device(gpu: Option<usize>) -> InferenceDevice {
                if let Some(gpu) = gpu {
                    tracing::warn!(gpu, "GPU requested but the CPU backend is selected, ignoring");
                }
                NdArrayDevice::default()
            }
        }
    }

    /// Backend used for training.
    pub type TrainingBackend = Autodiff<InferenceBackend>;
}
