use crate::{
    cache::ImportCache,
    container::{ExtensionTexture, SpecularGlossiness},
    error::ImportError,
    material::{
        AlphaMode, Material, ShaderVariant, ShadingModel, SpecularGlossinessProperties,
        TextureSlot,
    },
    naming::clean_name,
    texture::Texture,
    world::Handle,
};

const ALPHA_CUTOFF_DEFAULT: f32 = 0.5;

fn slot(
    cache: &ImportCache,
    index: usize,
    tex_coord: u32,
) -> Result<TextureSlot<Handle<Texture>>, ImportError> {
    let texture = cache
        .texture(index)
        .ok_or(ImportError::PhaseOrder("texture"))?;
    Ok(TextureSlot { texture, tex_coord })
}

fn info_slot(
    cache: &ImportCache,
    info: Option<gltf::texture::Info>,
) -> Result<Option<TextureSlot<Handle<Texture>>>, ImportError> {
    info.map(|info| slot(cache, info.texture().index(), info.tex_coord()))
        .transpose()
}

fn extension_slot(
    cache: &ImportCache,
    texture: Option<ExtensionTexture>,
) -> Result<Option<TextureSlot<Handle<Texture>>>, ImportError> {
    texture
        .map(|texture| slot(cache, texture.index, texture.tex_coord))
        .transpose()
}

/// Builds a material whose texture slots point at already loaded textures.
pub(crate) fn build_material(
    material: &gltf::Material,
    cache: &ImportCache,
) -> Result<Material, ImportError> {
    let pbr = material.pbr_metallic_roughness();
    let alpha = AlphaMode::from(material.alpha_mode());
    let specular_glossiness = match SpecularGlossiness::from_material(material)? {
        Some(extension) => Some(SpecularGlossinessProperties {
            diffuse_factor: extension.diffuse_factor,
            diffuse_texture: extension_slot(cache, extension.diffuse_texture)?,
            specular_factor: extension.specular_factor,
            glossiness_factor: extension.glossiness_factor,
            specular_glossiness_texture: extension_slot(
                cache,
                extension.specular_glossiness_texture,
            )?,
        }),
        None => None,
    };
    let model = if specular_glossiness.is_some() {
        ShadingModel::SpecularGlossiness
    } else {
        ShadingModel::MetallicRoughness
    };

    let normal = material.normal_texture();
    let occlusion = material.occlusion_texture();
    Ok(Material {
        name: match (material.name().map(clean_name), material.index()) {
            (Some(name), _) if !name.is_empty() => name,
            (_, Some(index)) => format!("Material_{}", index),
            (_, None) => String::from("Default"),
        },
        shader: ShaderVariant { model, alpha },
        alpha_cutoff: (alpha == AlphaMode::Mask)
            .then(|| material.alpha_cutoff().unwrap_or(ALPHA_CUTOFF_DEFAULT)),
        double_sided: material.double_sided(),
        base_color_factor: pbr.base_color_factor(),
        base_color_texture: info_slot(cache, pbr.base_color_texture())?,
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        metallic_roughness_texture: info_slot(cache, pbr.metallic_roughness_texture())?,
        normal_texture: normal
            .as_ref()
            .map(|normal| slot(cache, normal.texture().index(), normal.tex_coord()))
            .transpose()?,
        normal_scale: normal.as_ref().map_or(1.0, |normal| normal.scale()),
        occlusion_texture: occlusion
            .as_ref()
            .map(|occlusion| slot(cache, occlusion.texture().index(), occlusion.tex_coord()))
            .transpose()?,
        occlusion_strength: occlusion.as_ref().map_or(1.0, |occlusion| occlusion.strength()),
        emissive_factor: material.emissive_factor(),
        emissive_texture: info_slot(cache, material.emissive_texture())?,
        specular_glossiness,
    })
}
