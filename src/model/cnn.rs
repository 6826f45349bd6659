//! CNN Model Architecture for recyclable item classification
//!
//! A deliberately small network: three conv blocks followed by global
//! average pooling and a two-layer head. Small enough to train on a laptop
//! CPU and to run quantized on an edge box.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use super::frozen::ClassifierLayout;

/// Configuration for the RecycleClassifier CNN model
#[derive(Config, Debug)]
pub struct RecycleClassifierConfig {
    /// Number of output classes (default: 6 waste categories)
    #[config(default = "6")]
    pub num_classes: usize,

    /// Input image size (assumes square images)
    #[config(default = "224")]
    pub input_size: usize,

    /// Dropout rate applied before the classification head
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters in the first conv block; doubled in each following block
    #[config(default = "16")]
    pub base_filters: usize,

    /// Width of the hidden fully connected layer
    #[config(default = "64")]
    pub hidden_units: usize,
}

impl RecycleClassifierConfig {
    /// Initialize a model with freshly initialized weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> RecycleClassifier<B> {
        RecycleClassifier::new(self, device)
    }

    /// Tensor layout this configuration produces
    pub fn layout(&self) -> ClassifierLayout {
        ClassifierLayout {
            in_channels: self.in_channels,
            base_filters: self.base_filters,
            hidden_units: self.hidden_units,
            num_classes: self.num_classes,
        }
    }
}

/// Conv2d → BatchNorm → ReLU → 2x2 MaxPool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block with a 3x3 kernel
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();

        Self {
            conv,
            bn,
            relu: Relu::new(),
            pool,
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Recyclable item classifier
///
/// Architecture:
/// - 3 convolutional blocks (base, 2*base, 4*base filters), each halving
///   the spatial resolution
/// - Global Average Pooling
/// - Fully connected hidden layer with ReLU and dropout
/// - Linear classification head producing logits
#[derive(Module, Debug)]
pub struct RecycleClassifier<B: Backend> {
    // Public for weight export
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,

    pub global_pool: AdaptiveAvgPool2d,

    pub fc: Linear<B>,
    pub dropout: Dropout,
    pub head: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> RecycleClassifier<B> {
    /// Create a new RecycleClassifier from configuration
    pub fn new(config: &RecycleClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        let conv1 = ConvBlock::new(config.in_channels, base, device); // 224 -> 112
        let conv2 = ConvBlock::new(base, base * 2, device); // 112 -> 56
        let conv3 = ConvBlock::new(base * 2, base * 4, device); // 56 -> 28

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();

        let fc = LinearConfig::new(base * 4, config.hidden_units).init(device);
        let dropout = DropoutConfig::new(config.dropout_rate).init();
        let head = LinearConfig::new(config.hidden_units, config.num_classes).init(device);

        Self {
            conv1,
            conv2,
            conv3,
            global_pool,
            fc,
            dropout,
            head,
            num_classes: config.num_classes,
        }
    }

    /// Forward pass through the network
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, channels, height, width]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);

        // [B, C, H, W] -> [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc.forward(x);
        let x = Relu::new().forward(x);
        let x = self.dropout.forward(x);
        self.head.forward(x)
    }

    /// Forward pass with softmax for inference
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        burn::tensor::activation::softmax(self.forward(x), 1)
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn small_config() -> RecycleClassifierConfig {
        RecycleClassifierConfig::new()
            .with_base_filters(4)
            .with_hidden_units(8)
            .with_input_size(32)
    }

    #[test]
    fn test_default_config() {
        let config = RecycleClassifierConfig::new();
        assert_eq!(config.num_classes, 6);
        assert_eq!(config.input_size, 224);
        assert_eq!(config.in_channels, 3);
    }

    #[test]
    fn test_forward_shape() {
        let device = Default::default();
        let model: RecycleClassifier<TestBackend> = small_config().init(&device);

        let input = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [2, 6]);
        assert_eq!(model.num_classes(), 6);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model: RecycleClassifier<TestBackend> = small_config().init(&device);

        let input = Tensor::<TestBackend, 4>::ones([3, 3, 32, 32], &device);
        let probs: Vec<f32> = model
            .forward_softmax(input)
            .into_data()
            .to_vec()
            .unwrap();

        for row in probs.chunks(6) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_layout_matches_config() {
        let layout = small_config().with_num_classes(4).layout();
        assert_eq!(layout.base_filters, 4);
        assert_eq!(layout.hidden_units, 8);
        assert_eq!(layout.num_classes, 4);
    }
}
