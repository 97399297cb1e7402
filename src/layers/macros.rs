//! Macros to reduce boilerplate in layer implementations

/// Implements the property accessors of `LayerTrait` over a `LayerProperties` field
///
/// Usage inside an `impl LayerTrait for MyLayer` block:
/// ```ignore
/// impl_layer_trait!(MyLayer, properties);
/// ```
#[macro_export]
macro_rules! impl_layer_trait {
    ($layer_type:ty, $properties_field:ident) => {
        fn id(&self) -> &str {
            &self.$properties_field.id
        }

        fn name(&self) -> &str {
            &self.$properties_field.name
        }

        fn z_index(&self) -> i32 {
            self.$properties_field.z_index
        }

        fn set_z_index(&mut self, z_index: i32) {
            self.$properties_field.z_index = z_index;
        }

        fn opacity(&self) -> f32 {
            self.$properties_field.opacity
        }

        fn set_opacity(&mut self, opacity: f32) {
            self.$properties_field.opacity = opacity.clamp(0.0, 1.0);
        }

        fn is_visible(&self) -> bool {
            self.$properties_field.visible
        }

        fn set_visible(&mut self, visible: bool) {
            self.$properties_field.visible = visible;
        }

        fn is_base_layer(&self) -> bool {
            self.$properties_field.is_base_layer
        }

        fn in_range(&self) -> bool {
            self.$properties_field.in_range
        }

        fn set_in_range(&mut self, in_range: bool) {
            self.$properties_field.in_range = in_range;
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}
