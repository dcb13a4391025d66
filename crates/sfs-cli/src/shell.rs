//! Line-oriented command loop over a single device.
//!
//! Exactly one of `disk` / `fs` is populated at any time: mounting moves
//! the device into the filesystem value, unmounting moves it back. That
//! makes "format while mounted" and "mount twice" unrepresentable below
//! this layer, so the shell is the one reporting them.

use std::io::{BufRead, Write};
use std::str::FromStr;

use anyhow::{Result, anyhow};

use sfs_rs::disk::Disk;
use sfs_rs::fs::FileSystem;

enum Flow {
    Continue,
    Quit,
}

pub struct Shell {
    disk: Option<Disk>,
    fs: Option<FileSystem>,
}

impl Shell {
    #[must_use]
    pub fn new(disk: Disk) -> Self {
        Self {
            disk: Some(disk),
            fs: None,
        }
    }

    /// Runs the loop until `quit` or end of input, then unmounts and
    /// closes the device.
    ///
    /// # Errors
    /// Fails only when the input or output stream itself fails.
    pub fn run(mut self, input: &mut dyn BufRead, output: &mut dyn Write) -> Result<()> {
        loop {
            write!(output, "sfs> ")?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            let words: Vec<&str> = line.split_whitespace().collect();
            let Some((&command, args)) = words.split_first() else {
                continue;
            };

            match self.dispatch(command, args, output) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Quit) => break,
                Err(e) => writeln!(output, "error: {e:#}")?,
            }
        }

        self.shutdown();
        Ok(())
    }

    fn dispatch(&mut self, command: &str, args: &[&str], out: &mut dyn Write) -> Result<Flow> {
        match command {
            "debug" => self.cmd_debug(out)?,
            "format" => self.cmd_format(out)?,
            "mount" => self.cmd_mount(out)?,
            "unmount" => self.cmd_unmount(out)?,
            "create" => self.cmd_create(out)?,
            "remove" => self.cmd_remove(args, out)?,
            "stat" => self.cmd_stat(args, out)?,
            "read" => self.cmd_read(args, out)?,
            "write" => self.cmd_write(args, out)?,
            "help" => print_help(out)?,
            "quit" | "exit" => return Ok(Flow::Quit),
            other => writeln!(out, "unknown command: {other} (try `help`)")?,
        }
        Ok(Flow::Continue)
    }

    fn cmd_debug(&mut self, out: &mut dyn Write) -> Result<()> {
        let report = if let Some(fs) = self.fs.as_mut() {
            fs.report()
        } else if let Some(disk) = self.disk.as_mut() {
            FileSystem::debug_report(disk)
        } else {
            unreachable!("either the shell or the filesystem holds the device")
        };
        let report = report.map_err(|e| anyhow!("debug failed: {e:?}"))?;
        write!(out, "{report}")?;
        Ok(())
    }

    fn cmd_format(&mut self, out: &mut dyn Write) -> Result<()> {
        let Some(disk) = self.disk.as_mut() else {
            return Err(anyhow!("cannot format a mounted disk"));
        };
        FileSystem::format(disk).map_err(|e| anyhow!("format failed: {e:?}"))?;
        writeln!(out, "disk formatted")?;
        Ok(())
    }

    fn cmd_mount(&mut self, out: &mut dyn Write) -> Result<()> {
        if self.fs.is_some() {
            return Err(anyhow!("already mounted"));
        }
        let disk = self.disk.take().expect("device present when not mounted");
        match FileSystem::mount(disk) {
            Ok(fs) => {
                self.fs = Some(fs);
                writeln!(out, "disk mounted")?;
                Ok(())
            }
            Err(e) => {
                self.disk = Some(e.disk);
                Err(anyhow!("mount failed: {:?}", e.cause))
            }
        }
    }

    fn cmd_unmount(&mut self, out: &mut dyn Write) -> Result<()> {
        match self.fs.take() {
            Some(fs) => {
                self.disk = Some(fs.unmount());
                writeln!(out, "disk unmounted")?;
            }
            None => writeln!(out, "not mounted")?,
        }
        Ok(())
    }

    fn cmd_create(&mut self, out: &mut dyn Write) -> Result<()> {
        let inumber = self
            .mounted()?
            .create()
            .map_err(|e| anyhow!("create failed: {e:?}"))?;
        writeln!(out, "created inode {inumber}")?;
        Ok(())
    }

    fn cmd_remove(&mut self, args: &[&str], out: &mut dyn Write) -> Result<()> {
        let inumber: usize = parse_arg(args, 0, "inode")?;
        self.mounted()?
            .remove(inumber)
            .map_err(|e| anyhow!("remove failed: {e:?}"))?;
        writeln!(out, "removed inode {inumber}")?;
        Ok(())
    }

    fn cmd_stat(&mut self, args: &[&str], out: &mut dyn Write) -> Result<()> {
        let inumber: usize = parse_arg(args, 0, "inode")?;
        let size = self
            .mounted()?
            .stat(inumber)
            .map_err(|e| anyhow!("stat failed: {e:?}"))?;
        writeln!(out, "inode {inumber}: {size} bytes")?;
        Ok(())
    }

    fn cmd_read(&mut self, args: &[&str], out: &mut dyn Write) -> Result<()> {
        let inumber: usize = parse_arg(args, 0, "inode")?;
        let length: usize = parse_arg(args, 1, "length")?;
        let offset: usize = parse_arg(args, 2, "offset")?;

        let data = self
            .mounted()?
            .read(inumber, offset, length)
            .map_err(|e| anyhow!("read failed: {e:?}"))?;
        writeln!(out, "{} bytes read:", data.len())?;
        writeln!(out, "{}", String::from_utf8_lossy(&data))?;
        Ok(())
    }

    fn cmd_write(&mut self, args: &[&str], out: &mut dyn Write) -> Result<()> {
        let inumber: usize = parse_arg(args, 0, "inode")?;
        let data = *args
            .get(1)
            .ok_or_else(|| anyhow!("missing <data> argument"))?;
        let length: usize = parse_arg(args, 2, "length")?;
        let offset: usize = parse_arg(args, 3, "offset")?;

        let payload = &data.as_bytes()[..length.min(data.len())];
        let written = self
            .mounted()?
            .write(inumber, offset, payload)
            .map_err(|e| anyhow!("write failed: {e:?}"))?;
        writeln!(out, "{written} bytes written")?;
        Ok(())
    }

    fn mounted(&mut self) -> Result<&mut FileSystem> {
        self.fs.as_mut().ok_or_else(|| anyhow!("no filesystem mounted"))
    }

    fn shutdown(&mut self) {
        if let Some(fs) = self.fs.take() {
            self.disk = Some(fs.unmount());
        }
        if let Some(disk) = self.disk.take() {
            disk.close();
        }
    }
}

fn parse_arg<T: FromStr>(args: &[&str], index: usize, name: &str) -> Result<T> {
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow!("missing <{name}> argument"))?;
    raw.parse()
        .map_err(|_| anyhow!("invalid <{name}> argument: {raw}"))
}

fn print_help(out: &mut dyn Write) -> Result<()> {
    writeln!(out, "commands:")?;
    writeln!(out, "  debug                                    dump superblock and inodes")?;
    writeln!(out, "  format                                   write a fresh filesystem")?;
    writeln!(out, "  mount                                    mount the device")?;
    writeln!(out, "  unmount                                  unmount the device")?;
    writeln!(out, "  create                                   allocate an inode")?;
    writeln!(out, "  remove <inode>                           release an inode")?;
    writeln!(out, "  stat <inode>                             report file size")?;
    writeln!(out, "  read <inode> <length> <offset>           read a byte range")?;
    writeln!(out, "  write <inode> <data> <length> <offset>   write a byte range")?;
    writeln!(out, "  help                                     this text")?;
    writeln!(out, "  quit                                     leave the shell")?;
    Ok(())
}
