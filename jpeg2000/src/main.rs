use clap::Parser;
use std::error::Error;

use jpeg2000::Jp2k;

#[derive(Parser)]
struct Opts {
    #[clap(subcommand)]
    subcommand: SubCommand,
}

#[derive(Parser)]
enum SubCommand {
    /// Print the box tree of a .jp2 file, or the main header of a bare
    /// codestream
    Info(Info),

    /// Parse every tile-part of a .jp2 or .j2k/.jpc file and report them
    Decode(Decode),
}

#[derive(Parser)]
struct Info {
    /// Path to .jp2 or codestream file
    path: String,

    /// Also print the codestream of a .jp2 file
    #[clap(short, long)]
    codestream: bool,

    /// Print the tile-part headers in addition to the main header
    #[clap(short, long)]
    full: bool,
}

#[derive(Parser)]
struct Decode {
    /// Path to .jp2 or codestream file
    path: String,
}

fn run() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let opts: Opts = Opts::parse();

    match opts.subcommand {
        SubCommand::Info(c) => {
            let jp2k = Jp2k::open(&c.path)?;
            if c.codestream || c.full {
                if let Some(file) = jp2k.file().filter(|f| !f.boxes().is_empty()) {
                    println!("File:  {}\n{}", c.path, file);
                }
                println!("{}", jp2k.codestream(!c.full)?);
            } else {
                println!("{}", jp2k);
            }
        }
        SubCommand::Decode(c) => {
            let jp2k = Jp2k::open(&c.path)?;
            let codestream = jp2k.codestream(false)?;
            let geometry = jp2k.geometry()?;
            let (down, across) = geometry.num_tiles();
            println!(
                "{}: {} x {} x {}, {} tiles, {} tile-parts",
                c.path,
                geometry.rows(),
                geometry.cols(),
                geometry.num_components(),
                down as u64 * across as u64,
                codestream.tile_parts().len()
            );
        }
    }

    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    match run() {
        Err(e) => {
            return Err(e.to_string().into());
        }
        Ok(_) => Ok(()),
    }
}
