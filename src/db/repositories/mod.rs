mod processes;
mod readings;
