//! Frozen inference weights
//!
//! A trained [`RecycleClassifier`] is frozen before export: every BatchNorm is
//! folded into the preceding convolution and the weights are pulled out of
//! the backend into plain buffers. The result is plain data, so it is `Send +
//! Sync` regardless of backend and can sit behind an `Arc` shared by every
//! request handler. The forward pass rebuilds backend tensors per call using
//! Burn's functional conv op.

use burn::nn::pool::{AdaptiveAvgPool2dConfig, MaxPool2dConfig};
use burn::tensor::{
    activation::{relu, softmax},
    backend::Backend,
    module::conv2d,
    ops::ConvOptions,
    Tensor, TensorData,
};
use serde::{Deserialize, Serialize};

use super::cnn::{ConvBlock, RecycleClassifier};
use crate::utils::error::{EdgeError, Result};

/// Upper bound for every [`ClassifierLayout`] field
pub const MAX_LAYOUT_DIM: usize = 1 << 16;

/// Hyperparameters that determine the tensor shapes of a classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierLayout {
    pub in_channels: usize,
    pub base_filters: usize,
    pub hidden_units: usize,
    pub num_classes: usize,
}

impl ClassifierLayout {
    /// Output channels of the three conv blocks
    pub fn conv_channels(&self) -> [usize; 3] {
        let base = self.base_filters;
        [base, base.saturating_mul(2), base.saturating_mul(4)]
    }

    /// Names and shapes of every tensor, in serialization order
    pub fn tensor_shapes(&self) -> Vec<(String, Vec<usize>)> {
        let mut shapes = Vec::with_capacity(10);
        let mut in_channels = self.in_channels;

        for (i, out_channels) in self.conv_channels().into_iter().enumerate() {
            let name = format!("conv{}", i + 1);
            shapes.push((format!("{name}.weight"), vec![out_channels, in_channels, 3, 3]));
            shapes.push((format!("{name}.bias"), vec![out_channels]));
            in_channels = out_channels;
        }

        shapes.push(("fc.weight".to_string(), vec![in_channels, self.hidden_units]));
        shapes.push(("fc.bias".to_string(), vec![self.hidden_units]));
        shapes.push((
            "head.weight".to_string(),
            vec![self.hidden_units, self.num_classes],
        ));
        shapes.push(("head.bias".to_string(), vec![self.num_classes]));

        shapes
    }

    /// Total number of scalar parameters, `None` on overflow
    pub fn checked_num_parameters(&self) -> Option<usize> {
        self.tensor_shapes()
            .iter()
            .try_fold(0usize, |total, (_, shape)| {
                total.checked_add(checked_product(shape)?)
            })
    }

    /// Total number of scalar parameters of a validated layout
    pub fn num_parameters(&self) -> usize {
        self.checked_num_parameters().unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        let fields = [
            ("in_channels", self.in_channels),
            ("base_filters", self.base_filters),
            ("hidden_units", self.hidden_units),
            ("num_classes", self.num_classes),
        ];
        for (name, value) in fields {
            if value == 0 || value > MAX_LAYOUT_DIM {
                return Err(format!(
                    "layout field {} = {} is outside 1..={}",
                    name, value, MAX_LAYOUT_DIM
                ));
            }
        }
        if self.checked_num_parameters().is_none() {
            return Err(format!("layout {:?} has too many parameters", self));
        }
        Ok(())
    }
}

/// A named f32 tensor in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct NamedTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl NamedTensor {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, values: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            shape,
            values,
        }
    }

    pub fn num_values(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Product of `dims`, `None` on overflow
pub fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Convolution with BatchNorm folded in, followed by ReLU and 2x2 max pooling
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenConv {
    weight: Vec<f32>,
    /// [out_channels, in_channels, kernel_h, kernel_w]
    weight_shape: [usize; 4],
    bias: Vec<f32>,
}

impl FrozenConv {
    fn from_block<B: Backend>(block: &ConvBlock<B>) -> Result<Self> {
        let weight = block.conv.weight.val();
        let weight_shape = weight.dims();
        let mut weight = tensor_values(weight)?;

        let out_channels = weight_shape[0];
        let mut bias = match &block.conv.bias {
            Some(bias) => tensor_values(bias.val())?,
            None => vec![0.0; out_channels],
        };

        let gamma = tensor_values(block.bn.gamma.val())?;
        let beta = tensor_values(block.bn.beta.val())?;
        let mean = tensor_values(block.bn.running_mean.value())?;
        let var = tensor_values(block.bn.running_var.value())?;
        let epsilon = block.bn.epsilon as f32;

        let per_filter = weight.len() / out_channels;
        for o in 0..out_channels {
            let factor = gamma[o] / (var[o] + epsilon).sqrt();
            for w in &mut weight[o * per_filter..(o + 1) * per_filter] {
                *w *= factor;
            }
            bias[o] = (bias[o] - mean[o]) * factor + beta[o];
        }

        Ok(Self {
            weight,
            weight_shape,
            bias,
        })
    }

    fn forward<B: Backend>(&self, x: Tensor<B, 4>, device: &B::Device) -> Tensor<B, 4> {
        let weight = Tensor::<B, 4>::from_data(
            TensorData::new(self.weight.clone(), self.weight_shape),
            device,
        );
        let bias = Tensor::<B, 1>::from_data(
            TensorData::new(self.bias.clone(), [self.bias.len()]),
            device,
        );

        let x = conv2d(
            x,
            weight,
            Some(bias),
            ConvOptions::new([1, 1], [1, 1], [1, 1], 1),
        );
        let x = relu(x);
        MaxPool2dConfig::new([2, 2])
            .with_strides([2, 2])
            .init()
            .forward(x)
    }
}

/// Dense layer; weight is stored [in_features, out_features]
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenLinear {
    weight: Vec<f32>,
    weight_shape: [usize; 2],
    bias: Vec<f32>,
}

impl FrozenLinear {
    fn from_linear<B: Backend>(linear: &burn::nn::Linear<B>) -> Result<Self> {
        let weight = linear.weight.val();
        let weight_shape = weight.dims();
        let weight = tensor_values(weight)?;
        let bias = match &linear.bias {
            Some(bias) => tensor_values(bias.val())?,
            None => vec![0.0; weight_shape[1]],
        };

        Ok(Self {
            weight,
            weight_shape,
            bias,
        })
    }

    fn forward<B: Backend>(&self, x: Tensor<B, 2>, device: &B::Device) -> Tensor<B, 2> {
        let weight = Tensor::<B, 2>::from_data(
            TensorData::new(self.weight.clone(), self.weight_shape),
            device,
        );
        let bias = Tensor::<B, 1>::from_data(
            TensorData::new(self.bias.clone(), [self.bias.len()]),
            device,
        );

        x.matmul(weight) + bias.unsqueeze::<2>()
    }
}

/// Inference-only classifier weights, detached from any backend
#[derive(Debug, Clone, PartialEq)]
pub struct FrozenClassifier {
    layout: ClassifierLayout,
    convs: Vec<FrozenConv>,
    fc: FrozenLinear,
    head: FrozenLinear,
}

impl FrozenClassifier {
    /// Freeze a trained model, folding BatchNorm statistics into the convolutions
    pub fn from_model<B: Backend>(
        model: &RecycleClassifier<B>,
        layout: ClassifierLayout,
    ) -> Result<Self> {
        let convs = vec![
            FrozenConv::from_block(&model.conv1)?,
            FrozenConv::from_block(&model.conv2)?,
            FrozenConv::from_block(&model.conv3)?,
        ];
        let frozen = Self {
            layout,
            convs,
            fc: FrozenLinear::from_linear(&model.fc)?,
            head: FrozenLinear::from_linear(&model.head)?,
        };

        // A layout that disagrees with the model would produce an unloadable artifact
        Self::from_tensors(layout, frozen.to_tensors()).map_err(EdgeError::Export)
    }

    /// Rebuild from named tensors, checking every name and shape against `layout`
    pub fn from_tensors(
        layout: ClassifierLayout,
        tensors: Vec<NamedTensor>,
    ) -> std::result::Result<Self, String> {
        layout.validate()?;

        let expected = layout.tensor_shapes();
        if tensors.len() != expected.len() {
            return Err(format!(
                "expected {} tensors, found {}",
                expected.len(),
                tensors.len()
            ));
        }

        for (tensor, (name, shape)) in tensors.iter().zip(&expected) {
            if &tensor.name != name {
                return Err(format!("expected tensor '{}', found '{}'", name, tensor.name));
            }
            if &tensor.shape != shape {
                return Err(format!(
                    "tensor '{}' has shape {:?}, layout requires {:?}",
                    name, tensor.shape, shape
                ));
            }
            if tensor.values.len() != tensor.num_values() {
                return Err(format!(
                    "tensor '{}' holds {} values for shape {:?}",
                    name,
                    tensor.values.len(),
                    tensor.shape
                ));
            }
        }

        let mut tensors = tensors.into_iter();
        let mut next = || tensors.next().ok_or_else(|| "tensor list ended early".to_string());

        let mut convs = Vec::with_capacity(3);
        for _ in 0..3 {
            let weight = next()?;
            let bias = next()?;
            convs.push(FrozenConv {
                weight_shape: [
                    weight.shape[0],
                    weight.shape[1],
                    weight.shape[2],
                    weight.shape[3],
                ],
                weight: weight.values,
                bias: bias.values,
            });
        }

        let mut linear = || -> std::result::Result<FrozenLinear, String> {
            let weight = next()?;
            let bias = next()?;
            Ok(FrozenLinear {
                weight_shape: [weight.shape[0], weight.shape[1]],
                weight: weight.values,
                bias: bias.values,
            })
        };
        let fc = linear()?;
        let head = linear()?;

        Ok(Self {
            layout,
            convs,
            fc,
            head,
        })
    }

    /// Named tensors in serialization order
    pub fn to_tensors(&self) -> Vec<NamedTensor> {
        let names = self.layout.tensor_shapes();
        let mut values: Vec<(Vec<f32>, Vec<usize>)> = Vec::with_capacity(names.len());

        for conv in &self.convs {
            values.push((conv.weight.clone(), conv.weight_shape.to_vec()));
            values.push((conv.bias.clone(), vec![conv.bias.len()]));
        }
        for linear in [&self.fc, &self.head] {
            values.push((linear.weight.clone(), linear.weight_shape.to_vec()));
            values.push((linear.bias.clone(), vec![linear.bias.len()]));
        }

        names
            .into_iter()
            .zip(values)
            .map(|((name, _), (values, shape))| NamedTensor::new(name, shape, values))
            .collect()
    }

    pub fn layout(&self) -> ClassifierLayout {
        self.layout
    }

    /// Logits for a batch of CHW inputs, shape [batch, num_classes]
    pub fn logits<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let device = x.device();

        let mut x = x;
        for conv in &self.convs {
            x = conv.forward(x, &device);
        }

        let x = AdaptiveAvgPool2dConfig::new([1, 1]).init().forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = relu(self.fc.forward(x, &device));
        self.head.forward(x, &device)
    }

    /// Class probabilities for a batch of CHW inputs
    pub fn forward<B: Backend>(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.logits(x), 1)
    }
}

/// Copy a tensor's values out of the backend as f32
pub fn tensor_values<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| EdgeError::Inference(format!("Failed to read tensor data: {:?}", e)))
}
