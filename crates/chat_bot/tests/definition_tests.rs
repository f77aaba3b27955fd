//! The bundled growth tracker definition

use chat_bot::{Bot, BotConfig, BotDefinition};

const GROWTH_BOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../demos/growth_bot.yaml");

const UPDATE: &str = "Month: January Child's name: John Weight: 30.5 kg Height: 89.1 cm";

async fn growth_bot() -> Bot {
    let definition = BotDefinition::from_file(GROWTH_BOT).unwrap();
    Bot::from_definition(&definition, BotConfig::default()).unwrap()
}

#[tokio::test]
async fn test_growth_conversation() {
    let bot = growth_bot().await;
    assert_eq!(bot.config().name, "growth_bot");

    let menu = bot.process_message("user1", "exit").await.unwrap();
    assert!(menu.starts_with("Hi there, this is GrowthBot!"));

    let prompt = bot.process_message("user1", "2").await.unwrap();
    assert!(prompt.starts_with("Please provide the growth information"));

    assert_eq!(
        bot.process_message("user1", UPDATE).await.unwrap(),
        "Thank you for updating John's growth in January with height 89.1 and weight 30.5"
    );
    assert_eq!(
        bot.process_message("user1", "error").await.unwrap(),
        "Custom error message for update_growth_data state."
    );

    bot.process_message("user1", "exit").await.unwrap();
    assert_eq!(
        bot.process_message("user1", "1").await.unwrap(),
        "Growth history of your child: Name: John Height: 89.1 Weight: 30.5 Month: January. Type 'exit' to go back."
    );
    bot.stop().await;
}

#[tokio::test]
async fn test_flagged_measurement_error() {
    let bot = growth_bot().await;
    bot.process_message("user1", "2").await.unwrap();
    bot.flag_error("user1", "invalid_measurement").await.unwrap();

    assert_eq!(
        bot.process_message("user1", UPDATE).await.unwrap(),
        "Weight and height must be numbers, please try again."
    );
    bot.stop().await;
}
