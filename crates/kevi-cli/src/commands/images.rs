//! Images command - list images referenced by rendered manifests

use std::io::Read;
use std::path::Path;

use kevi_engine::find_images;

use crate::error::Result;

pub fn run(input: &Path) -> Result<()> {
    let data = if input == Path::new("-") {
        let mut data = Vec::new();
        std::io::stdin().read_to_end(&mut data)?;
        data
    } else {
        std::fs::read(input)?
    };

    for image in find_images(&data) {
        println!("{}", image);
    }
    Ok(())
}
