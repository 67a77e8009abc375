use std::{env, error::Error, fs};

// Must match dispatch::THREAD_GROUP_WIDTH.
const WORKGROUP_SIZE: u32 = 256;

const LAYOUTS: [&str; 2] = ["aos", "soa"];

// All shaders reside in the 'src/shaders' directory. Files starting with '_' are
// partials and only get rendered through an include.
fn generate_shaders() -> std::result::Result<(), Box<dyn Error>> {
    let tera = tera::Tera::new("src/shaders/*")?;
    println!("cargo:rerun-if-changed=src/shaders/");
    let output_path = env::var("OUT_DIR")?;
    for layout in LAYOUTS {
        let mut context = tera::Context::new();
        context.insert("workgroup_size", &WORKGROUP_SIZE);
        context.insert("soa", &(layout == "soa"));
        fs::create_dir_all(format!("{}/shaders/{}/", output_path, layout))?;
        for file in fs::read_dir("src/shaders")? {
            let file = file?;
            let path = file.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("wgsl") {
                continue;
            }
            let file = file.file_name();
            let file_name = file.to_str().ok_or("non utf-8 shader name")?;
            if file_name.starts_with('_') {
                continue;
            }
            let result = tera.render(file_name, &context)?;
            fs::write(
                format!("{}/shaders/{}/{}", output_path, layout, file_name),
                result,
            )?;
            println!("cargo:rerun-if-changed=src/shaders/{}", file_name);
        }
    }
    Ok(())
}

fn main() {
    if let Err(err) = generate_shaders() {
        // panic here for a nicer error message, otherwise it will
        // be flattened to one line for some reason
        panic!("Unable to generate shaders\n{}", err);
    }
}
