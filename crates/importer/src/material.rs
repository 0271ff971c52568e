use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{texture::Texture, world::Handle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

impl From<gltf::material::AlphaMode> for AlphaMode {
    fn from(mode: gltf::material::AlphaMode) -> Self {
        match mode {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShadingModel {
    #[default]
    MetallicRoughness,
    SpecularGlossiness,
}

/// Shader variant: shading model crossed with alpha mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShaderVariant {
    pub model: ShadingModel,
    pub alpha: AlphaMode,
}

impl Display for ShaderVariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let model = match self.model {
            ShadingModel::MetallicRoughness => "MetallicRoughness",
            ShadingModel::SpecularGlossiness => "SpecularGlossiness",
        };
        write!(f, "{}{:?}", model, self.alpha)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureSlot<T> {
    pub texture: T,
    pub tex_coord: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecularGlossinessProperties<T> {
    pub diffuse_factor: [f32; 4],
    pub diffuse_texture: Option<TextureSlot<T>>,
    pub specular_factor: [f32; 3],
    pub glossiness_factor: f32,
    pub specular_glossiness_texture: Option<TextureSlot<T>>,
}

/// Surface description. `T` is how textures are referred to: live handles
/// in a world, or artifact paths once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material<T = Handle<Texture>> {
    pub name: String,
    pub shader: ShaderVariant,
    pub alpha_cutoff: Option<f32>,
    pub double_sided: bool,
    pub base_color_factor: [f32; 4],
    pub base_color_texture: Option<TextureSlot<T>>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<TextureSlot<T>>,
    pub normal_texture: Option<TextureSlot<T>>,
    pub normal_scale: f32,
    pub occlusion_texture: Option<TextureSlot<T>>,
    pub occlusion_strength: f32,
    pub emissive_factor: [f32; 3],
    pub emissive_texture: Option<TextureSlot<T>>,
    pub specular_glossiness: Option<SpecularGlossinessProperties<T>>,
}

impl<T> Default for Material<T> {
    fn default() -> Self {
        Self {
            name: String::new(),
            shader: ShaderVariant::default(),
            alpha_cutoff: None,
            double_sided: false,
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
            normal_texture: None,
            normal_scale: 1.0,
            occlusion_texture: None,
            occlusion_strength: 1.0,
            emissive_factor: [0.0; 3],
            emissive_texture: None,
            specular_glossiness: None,
        }
    }
}

impl<T> Material<T> {
    /// Material for primitives that name none.
    pub fn default_material() -> Self {
        Self {
            name: String::from("Default"),
            ..Default::default()
        }
    }

    /// Every texture slot, in declaration order.
    pub fn textures(&self) -> impl Iterator<Item = &T> {
        let base = [
            &self.base_color_texture,
            &self.metallic_roughness_texture,
            &self.normal_texture,
            &self.occlusion_texture,
            &self.emissive_texture,
        ];
        let extension = self
            .specular_glossiness
            .iter()
            .flat_map(|extension| {
                [
                    &extension.diffuse_texture,
                    &extension.specular_glossiness_texture,
                ]
            });
        base.into_iter()
            .chain(extension)
            .filter_map(|slot| slot.as_ref().map(|slot| &slot.texture))
    }

    /// Rewrites every texture reference, failing on the first error.
    pub fn try_map_textures<U, E>(
        self,
        mut f: impl FnMut(T) -> Result<U, E>,
    ) -> Result<Material<U>, E> {
        let mut slot = |slot: Option<TextureSlot<T>>| -> Result<Option<TextureSlot<U>>, E> {
            slot.map(|slot| {
                Ok(TextureSlot {
                    texture: f(slot.texture)?,
                    tex_coord: slot.tex_coord,
                })
            })
            .transpose()
        };
        let base_color_texture = slot(self.base_color_texture)?;
        let metallic_roughness_texture = slot(self.metallic_roughness_texture)?;
        let normal_texture = slot(self.normal_texture)?;
        let occlusion_texture = slot(self.occlusion_texture)?;
        let emissive_texture = slot(self.emissive_texture)?;
        let specular_glossiness = match self.specular_glossiness {
            Some(extension) => Some(SpecularGlossinessProperties {
                diffuse_factor: extension.diffuse_factor,
                diffuse_texture: slot(extension.diffuse_texture)?,
                specular_factor: extension.specular_factor,
                glossiness_factor: extension.glossiness_factor,
                specular_glossiness_texture: slot(extension.specular_glossiness_texture)?,
            }),
            None => None,
        };
        Ok(Material {
            name: self.name,
            shader: self.shader,
            alpha_cutoff: self.alpha_cutoff,
            double_sided: self.double_sided,
            base_color_factor: self.base_color_factor,
            base_color_texture,
            metallic_factor: self.metallic_factor,
            roughness_factor: self.roughness_factor,
            metallic_roughness_texture,
            normal_texture,
            normal_scale: self.normal_scale,
            occlusion_texture,
            occlusion_strength: self.occlusion_strength,
            emissive_factor: self.emissive_factor,
            emissive_texture,
            specular_glossiness,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn shader_variant_names() {
        let variant = ShaderVariant {
            model: ShadingModel::SpecularGlossiness,
            alpha: AlphaMode::Blend,
        };
        assert_eq!(variant.to_string(), "SpecularGlossinessBlend");
        assert_eq!(
            Material::<usize>::default_material().shader.to_string(),
            "MetallicRoughnessOpaque"
        );
    }

    #[test]
    fn maps_every_texture_slot() {
        let material = Material {
            base_color_texture: Some(TextureSlot {
                texture: 1usize,
                tex_coord: 0,
            }),
            specular_glossiness: Some(SpecularGlossinessProperties {
                diffuse_factor: [1.0; 4],
                diffuse_texture: Some(TextureSlot {
                    texture: 2,
                    tex_coord: 1,
                }),
                specular_factor: [1.0; 3],
                glossiness_factor: 1.0,
                specular_glossiness_texture: None,
            }),
            ..Default::default()
        };
        let mapped = material
            .try_map_textures(|index| Ok::<_, ()>(format!("texture_{}.png", index)))
            .unwrap();
        let names: Vec<&String> = mapped.textures().collect();
        assert_eq!(names, vec!["texture_1.png", "texture_2.png"]);
        assert!(Material::<usize>::default()
            .try_map_textures(|_| Err::<usize, _>("unused"))
            .is_ok());
    }
}
