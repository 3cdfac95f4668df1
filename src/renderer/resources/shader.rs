use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Vertex and fragment modules of the static pipeline. Only needed while the pipeline is built.
pub struct GraphicsShader {
    pub vert_mod: vk::ShaderModule,
    pub frag_mod: vk::ShaderModule,
    device: Arc<ash::Device>,
}

impl GraphicsShader {
    pub fn new(vert_path: &Path, frag_path: &Path, device: Arc<ash::Device>) -> Result<Self> {
        let vert_mod = create_shader_module(vert_path, &device)?;
        let frag_mod = match create_shader_module(frag_path, &device) {
            Ok(module) => module,
            Err(err) => {
                unsafe { device.destroy_shader_module(vert_mod, None) };
                return Err(err);
            }
        };
        Ok(Self { vert_mod, frag_mod, device })
    }
}

impl Drop for GraphicsShader {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.vert_mod, None);
            self.device.destroy_shader_module(self.frag_mod, None);
        }
    }
}

fn create_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(filepath)
        .wrap_err_with(|| format!("Failed to read shader {}", filepath.display()))?;
    let code = parse_spirv(&bytes)
        .wrap_err_with(|| format!("Invalid shader {}", filepath.display()))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default()
        .code(&code);

    let shader_module = unsafe {
        device.create_shader_module(&shader_module_info, None)?
    };

    Ok(shader_module)
}

/// Reinterprets a SPIR-V file as aligned words and checks the magic number
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    let code = ash::util::read_spv(&mut Cursor::new(bytes))?;
    match code.first() {
        Some(&SPIRV_MAGIC) => Ok(code),
        Some(word) => Err(eyre!("Bad SPIR-V magic number {word:#010x}")),
        None => Err(eyre!("Empty SPIR-V module")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    #[test]
    fn well_formed_module_is_read_as_words() {
        let words = [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0];
        assert_eq!(parse_spirv(&words_to_bytes(&words)).unwrap(), words);
    }

    #[test]
    fn truncated_module_is_rejected() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0000]);
        bytes.pop();
        assert!(parse_spirv(&bytes).is_err());
    }

    #[test]
    fn foreign_file_is_rejected() {
        assert!(parse_spirv(b"\x89PNG\r\n\x1a\n").is_err());
        assert!(parse_spirv(&[]).is_err());
    }
}
