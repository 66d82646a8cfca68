use std::env;
use std::env::current_dir;
use std::fs::read_to_string;
use std::io::Read;
use std::path::Path;

use anyhow::{Error, bail};
use console::Term;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use crate::danbooru::gallery::{Category, GalleryStore};
use crate::danbooru::io::AppPaths;
use crate::danbooru::service::LibraryService;
use crate::danbooru::worker::Progress;

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

const USAGE: &str = "\
usage: artist_manager <command> [args]

artist list:
  list [filter]              show the artist list, optionally filtered
  add <name>                 add one artist
  import <file|->            import a delimited batch of names (- for stdin)
  rename <old> <new>         rename an artist, moving its cached image
  remove <name>              remove an artist and its cached image

images:
  set-image <name> <path>    supply or replace an artist's cached image
  sync                       fetch missing images from the search API

gallery:
  gallery list                                show showcase entries
  gallery add <title> <run|combo> <image> [prompt]
  gallery update <id> [--title T] [--category C] [--prompt P] [--image PATH]
  gallery remove <id>

setup:
  login <username> <api-key>  save API credentials";

/// A program class that handles the flow of the manager user experience and
/// steps of execution.
pub(crate) struct Program;

impl Program {
    /// Creates a new instance of the program.
    pub(crate) fn new() -> Self {
        Self
    }

    /// Runs the manager program.
    pub(crate) fn run(&self) -> Result<(), Error> {
        Term::stdout().set_title("artist manager");
        trace!("Starting artist manager...");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);

        let base = current_dir().map_err(|e| {
            error!("Unable to get working directory: {}", e);
            anyhow::anyhow!("failed to get working directory: {e}")
        })?;
        trace!("Program Working Directory: {}", base.display());

        let paths = AppPaths::new(base);
        let mut service = LibraryService::open(paths)?;

        let args: Vec<String> = env::args().skip(1).collect();
        let command = args.first().map(String::as_str).unwrap_or("");
        match command {
            "list" => self.list(&service, args.get(1).map(String::as_str)),
            "add" => self.add(&mut service, &args[1..]),
            "import" => self.import(&mut service, &args[1..]),
            "rename" => self.rename(&mut service, &args[1..]),
            "remove" => self.remove(&mut service, &args[1..]),
            "set-image" => self.set_image(&service, &args[1..]),
            "login" => self.login(&mut service, &args[1..]),
            "sync" => self.sync(&service),
            "gallery" => self.gallery(&service, &args[1..]),
            _ => {
                println!("{USAGE}");
                Ok(())
            }
        }
    }

    fn list(&self, service: &LibraryService, filter: Option<&str>) -> Result<(), Error> {
        let names = service.names();
        let mut shown = 0;
        for name in &names {
            if let Some(filter) = filter {
                if !name.contains(filter) {
                    continue;
                }
            }
            let marker = if service.artifact_path(name).exists() {
                "cached"
            } else {
                "      "
            };
            println!("  [{marker}] {name}");
            shown += 1;
        }
        println!("{shown} of {} artists", names.len());
        Ok(())
    }

    fn add(&self, service: &mut LibraryService, args: &[String]) -> Result<(), Error> {
        let [name] = args else {
            bail!("usage: add <name>");
        };
        if service.add_name(name)? {
            println!("added");
        } else {
            println!("already in the list (or blank)");
        }
        Ok(())
    }

    fn import(&self, service: &mut LibraryService, args: &[String]) -> Result<(), Error> {
        let [source] = args else {
            bail!("usage: import <file|->");
        };

        let raw = if source == "-" {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        } else {
            read_to_string(source)?
        };

        let added = service.import_names(&raw)?;
        println!("{added} new artists imported ({} total)", service.len());
        Ok(())
    }

    fn rename(&self, service: &mut LibraryService, args: &[String]) -> Result<(), Error> {
        let [old, new] = args else {
            bail!("usage: rename <old> <new>");
        };
        match service.rename(old, new)? {
            Some(new) => println!("renamed {old:?} to {new:?}"),
            None => println!("nothing to do"),
        }
        Ok(())
    }

    fn remove(&self, service: &mut LibraryService, args: &[String]) -> Result<(), Error> {
        let [name] = args else {
            bail!("usage: remove <name>");
        };

        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Remove {name:?} and its cached image? This cannot be undone"
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("cancelled");
            return Ok(());
        }

        if service.remove(name)? {
            println!("removed");
        } else {
            println!("{name:?} is not in the list");
        }
        Ok(())
    }

    fn set_image(&self, service: &LibraryService, args: &[String]) -> Result<(), Error> {
        let [name, path] = args else {
            bail!("usage: set-image <name> <path>");
        };
        let target = service.replace_image(name, Path::new(path))?;
        println!("image stored at {}", target.display());
        Ok(())
    }

    fn login(&self, service: &mut LibraryService, args: &[String]) -> Result<(), Error> {
        let [username, api_key] = args else {
            bail!("usage: login <username> <api-key>");
        };
        service.save_login(username, api_key)?;
        println!("credentials saved");
        Ok(())
    }

    /// Runs a reconciliation pass, rendering the progress channel onto a
    /// terminal progress bar until the run reports completion.
    fn sync(&self, service: &LibraryService) -> Result<(), Error> {
        if service.is_sync_running() {
            bail!("a sync is already running");
        }
        let receiver = service.start_sync()?;

        let bar = ProgressBar::new(service.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{wide_bar} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        for event in receiver.iter() {
            match event {
                Progress::Log(line) => bar.println(line),
                Progress::Entity { index, total } => {
                    bar.set_length(total as u64);
                    bar.set_position(index as u64);
                }
                Progress::Finished(stats) => {
                    bar.finish_with_message(stats.summary());
                }
            }
        }
        Ok(())
    }

    fn gallery(&self, service: &LibraryService, args: &[String]) -> Result<(), Error> {
        let mut gallery = GalleryStore::load(service.paths());
        let command = args.first().map(String::as_str).unwrap_or("");
        match command {
            "list" => {
                for entry in gallery.entries() {
                    println!(
                        "  {} [{}] {} ({})",
                        entry.id,
                        entry.category.label(),
                        entry.title,
                        entry.image
                    );
                    if !entry.prompt.is_empty() {
                        println!("      prompt: {}", entry.prompt);
                    }
                }
                println!("{} entries", gallery.entries().len());
                Ok(())
            }
            "add" => {
                let (title, category, image) = match &args[1..] {
                    [title, category, image, ..] => (title, category, image),
                    _ => bail!("usage: gallery add <title> <run|combo> <image> [prompt]"),
                };
                let Some(category) = Category::parse(category) else {
                    bail!("category must be \"run\" or \"combo\"");
                };
                let prompt = args.get(4).map(String::as_str).unwrap_or("");

                let id = gallery.add(title, category, Path::new(image), prompt)?;
                println!("entry {id} added");
                Ok(())
            }
            "update" => {
                let Some(id) = args.get(1).and_then(|raw| raw.parse::<u64>().ok()) else {
                    bail!(
                        "usage: gallery update <id> [--title T] [--category C] \
                         [--prompt P] [--image PATH]"
                    );
                };

                let mut title = None;
                let mut category = None;
                let mut prompt = None;
                let mut image = None;
                let mut rest = args[2..].iter();
                while let Some(flag) = rest.next() {
                    let value = rest
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("{flag} needs a value"))?;
                    match flag.as_str() {
                        "--title" => title = Some(value.as_str()),
                        "--category" => {
                            category = Some(
                                Category::parse(value)
                                    .ok_or_else(|| anyhow::anyhow!("bad category {value:?}"))?,
                            );
                        }
                        "--prompt" => prompt = Some(value.as_str()),
                        "--image" => image = Some(Path::new(value.as_str())),
                        _ => bail!("unknown flag {flag:?}"),
                    }
                }

                gallery.update(id, title, category, prompt, image)?;
                if let Some(entry) = gallery.get(id) {
                    println!("entry {id} updated ({})", entry.title);
                }
                Ok(())
            }
            "remove" => {
                let Some(id) = args.get(1).and_then(|raw| raw.parse::<u64>().ok()) else {
                    bail!("usage: gallery remove <id>");
                };
                if gallery.remove(id)? {
                    println!("entry {id} removed");
                } else {
                    println!("no entry with id {id}");
                }
                Ok(())
            }
            _ => {
                println!("{USAGE}");
                Ok(())
            }
        }
    }
}
