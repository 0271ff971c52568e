/// Makes a document name safe for object and file names.
///
/// Only printable ASCII up to `_` and lowercase letters survive. Path
/// separators become spaces, colons become underscores and quotes are
/// dropped.
pub fn clean_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || (' '..='_').contains(c) || *c == '.')
        .filter_map(|c| match c {
            '/' | '\\' => Some(' '),
            ':' => Some('_'),
            '"' => None,
            c => Some(c),
        })
        .collect()
}

pub fn blend_shape_name(mesh: usize, target: usize) -> String {
    format!("Target_{}_{}", mesh, target)
}

pub fn mesh_name(mesh: Option<&str>, mesh_index: usize, primitive: usize) -> String {
    let base = match mesh {
        Some(name) if !clean_name(name).is_empty() => clean_name(name),
        _ => format!("Mesh_{}", mesh_index),
    };
    if primitive == 0 {
        base
    } else {
        format!("{}_{}", base, primitive)
    }
}

pub fn node_name(node: Option<&str>, index: usize) -> String {
    match node.map(clean_name) {
        Some(name) if !name.is_empty() => name,
        _ => format!("GLTFNode_{}", index),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cleans_names() {
        assert_eq!(clean_name("a/b\\c:d\"e"), "a b c_de");
        assert_eq!(clean_name("Körper~{x}"), "Krperx");
        assert_eq!(clean_name("Armature.001"), "Armature.001");
    }

    #[test]
    fn generated_names() {
        assert_eq!(blend_shape_name(3, 1), "Target_3_1");
        assert_eq!(mesh_name(None, 2, 0), "Mesh_2");
        assert_eq!(mesh_name(Some("Body"), 2, 1), "Body_1");
        assert_eq!(node_name(None, 7), "GLTFNode_7");
        assert_eq!(node_name(Some(""), 2), "GLTFNode_2");
        assert_eq!(node_name(Some("Hip:L"), 2), "Hip_L");
    }
}
