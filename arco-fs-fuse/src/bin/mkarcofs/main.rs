mod cli;

use std::process::ExitCode;

use arco_fs::ArcoFileSystem;
use arco_fs_fuse::{MkfsError, format_image, pack};
use clap::Parser;
use cli::Cli;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("mkarcofs: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), MkfsError> {
    let afs = format_image(&cli.image, cli.size)?;
    let root = ArcoFileSystem::root_inode(&afs);
    pack(&root, &cli.add)?;

    let stat = afs.lock().statfs();
    println!("image={:?}", cli.image);
    println!(
        "blocks: {}/{} free, inodes: {}/{} free, block size {}",
        stat.free_blocks, stat.blocks, stat.free_inodes, stat.inodes, stat.block_size
    );

    Ok(())
}
